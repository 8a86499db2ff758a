//! Rendering and delivery of reports through the file, email, and print
//! channels.
//!
//! Every export re-reads the report and re-resolves it, so the output always
//! reflects current persisted content. Channels are independent: each call
//! carries its own timeout and a failure in one never undoes another.

use std::fmt::{self, Write as _};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, info_span, warn, Span};

use super::domain::{Report, ReportId};
use super::resolver::{Block, Media, RenderedDocument, TemplateResolver};
use super::store::{ReportStore, StoreError};
use crate::config::ExportConfig;

/// A composed document ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBinary {
    pub bytes: Vec<u8>,
    pub mime: mime::Mime,
    pub extension: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to compose document: {0}")]
    Compose(String),
}

impl From<fmt::Error> for RenderError {
    fn from(err: fmt::Error) -> Self {
        Self::Compose(err.to_string())
    }
}

/// Document composition capability (`RenderedDocument` to bytes).
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &RenderedDocument) -> Result<RenderedBinary, RenderError>;
}

/// Self-contained HTML output with inline styles and remote image links.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn render(&self, document: &RenderedDocument) -> Result<RenderedBinary, RenderError> {
        let html = render_html(document)?;
        Ok(RenderedBinary {
            bytes: html.into_bytes(),
            mime: mime::TEXT_HTML_UTF_8,
            extension: "html",
        })
    }
}

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;color:#212121;margin:32px}\
h1{margin-bottom:4px}.subtitle{color:#616161;margin-top:0}\
table{border-collapse:collapse;margin:8px 0}td,th{border:1px solid #E0E0E0;padding:4px 8px}\
.pair{display:flex;gap:12px}.photo img{max-width:320px}\
.placeholder{border:1px dashed #9E9E9E;color:#9E9E9E;padding:24px}\
.bar{background:#E0E0E0;height:12px;width:320px}.bar>div{background:#2E7D32;height:12px}\
.badge{color:#fff;padding:2px 8px;border-radius:4px}";

fn render_html(document: &RenderedDocument) -> Result<String, fmt::Error> {
    let mut html = String::new();
    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(
        html,
        "<html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head><body>",
        escape_html(&document.title),
        STYLE
    )?;
    writeln!(html, "<h1>{}</h1>", escape_html(&document.title))?;
    if let Some(subtitle) = &document.subtitle {
        writeln!(html, "<p class=\"subtitle\">{}</p>", escape_html(subtitle))?;
    }
    writeln!(
        html,
        "<p class=\"subtitle\">Generated {} by {}</p>",
        escape_html(&document.generated_on),
        escape_html(&document.generated_by)
    )?;

    if !document.summary.is_empty() {
        html.push_str("<table>");
        for fact in &document.summary {
            write!(
                html,
                "<tr><th>{}</th><td>{}</td></tr>",
                escape_html(&fact.label),
                escape_html(&fact.value)
            )?;
        }
        html.push_str("</table>\n");
    }

    for section in &document.sections {
        writeln!(html, "<h2>{}</h2>", escape_html(&section.heading))?;
        for block in &section.blocks {
            render_block(&mut html, block)?;
        }
    }

    html.push_str("</body></html>\n");
    Ok(html)
}

fn render_block(html: &mut String, block: &Block) -> fmt::Result {
    match block {
        Block::Paragraph { text } => writeln!(html, "<p>{}</p>", escape_html(text)),
        Block::Facts { rows } => {
            html.push_str("<table>");
            for fact in rows {
                write!(
                    html,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape_html(&fact.label),
                    escape_html(&fact.value)
                )?;
            }
            writeln!(html, "</table>")
        }
        Block::Table { columns, rows } => {
            html.push_str("<table><tr>");
            for column in columns {
                write!(html, "<th>{}</th>", escape_html(column))?;
            }
            html.push_str("</tr>");
            for row in rows {
                html.push_str("<tr>");
                for cell in row {
                    write!(html, "<td>{}</td>", escape_html(cell))?;
                }
                html.push_str("</tr>");
            }
            writeln!(html, "</table>")
        }
        Block::Media { media, caption } => {
            render_media(html, media)?;
            match caption {
                Some(caption) => writeln!(html, "<p>{}</p>", escape_html(caption)),
                None => Ok(()),
            }
        }
        Block::MediaPair {
            before,
            after,
            caption,
        } => {
            html.push_str("<div class=\"pair\"><div><h3>Before</h3>");
            render_media(html, before)?;
            html.push_str("</div><div><h3>After</h3>");
            render_media(html, after)?;
            html.push_str("</div></div>");
            if caption.is_empty() {
                writeln!(html)
            } else {
                writeln!(html, "<p>{}</p>", escape_html(caption))
            }
        }
        Block::Progress { percent, label } => writeln!(
            html,
            "<div class=\"bar\"><div style=\"width:{percent}%\"></div></div><p>{}</p>",
            escape_html(label)
        ),
        Block::Status {
            label,
            status_label,
            color,
        } => writeln!(
            html,
            "<p>{} <span class=\"badge\" style=\"background:{color}\">{}</span></p>",
            escape_html(label),
            escape_html(status_label)
        ),
        Block::Rating { value, max } => {
            let filled = usize::from(*value.min(max));
            let empty = usize::from(*max) - filled;
            writeln!(
                html,
                "<p class=\"rating\">{}{} ({value}/{max})</p>",
                "&#9733;".repeat(filled),
                "&#9734;".repeat(empty)
            )
        }
        Block::Placeholder {
            artifact_id,
            message,
        } => writeln!(
            html,
            "<div class=\"placeholder\">{} ({})</div>",
            escape_html(message),
            escape_html(artifact_id)
        ),
    }
}

fn render_media(html: &mut String, media: &Media) -> fmt::Result {
    match media {
        Media::Photo {
            url,
            title,
            taken_on,
            ..
        } => {
            let alt = title.as_deref().unwrap_or("Photo");
            write!(
                html,
                "<figure class=\"photo\"><img src=\"{}\" alt=\"{}\">",
                escape_html(url),
                escape_html(alt)
            )?;
            if let Some(taken_on) = taken_on {
                write!(html, "<figcaption>{}</figcaption>", escape_html(taken_on))?;
            }
            writeln!(html, "</figure>")
        }
        Media::Missing { photo_id, message } => writeln!(
            html,
            "<div class=\"placeholder\">{} ({})</div>",
            escape_html(message),
            escape_html(photo_id.as_str())
        ),
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportChannel {
    File,
    Email,
    Print,
}

impl ExportChannel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Email => "email",
            Self::Print => "print",
        }
    }
}

impl fmt::Display for ExportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportChannelError {
    #[error("{channel} export timed out after {after:?}")]
    Timeout {
        channel: ExportChannel,
        after: Duration,
    },
    #[error("{channel} export failed: {reason}")]
    Failed {
        channel: ExportChannel,
        reason: String,
    },
    /// Caller input the channel refused before anything was dispatched.
    #[error("{channel} export rejected: {reason}")]
    Rejected {
        channel: ExportChannel,
        reason: String,
    },
}

impl ExportChannelError {
    pub fn channel(&self) -> ExportChannel {
        match self {
            Self::Timeout { channel, .. }
            | Self::Failed { channel, .. }
            | Self::Rejected { channel, .. } => *channel,
        }
    }

    fn rejected(channel: ExportChannel, reason: impl Into<String>) -> Self {
        Self::Rejected {
            channel,
            reason: reason.into(),
        }
    }

    fn failed(channel: ExportChannel, reason: impl Into<String>) -> Self {
        Self::Failed {
            channel,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a mail or print backend.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub title: String,
    pub document: Attachment,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), TransportError>;
}

#[async_trait]
pub trait PrintSpooler: Send + Sync {
    /// Queue a job, returning the spooler's job reference.
    async fn submit(&self, job: PrintJob) -> Result<String, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub report_id: ReportId,
    pub channel: ExportChannel,
    /// Written path, recipient address, or print job reference.
    pub destination: String,
    pub bytes: usize,
    pub mime: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Channel(#[from] ExportChannelError),
}

/// Optional overrides for the email channel.
#[derive(Debug, Clone, Default)]
pub struct EmailOptions {
    pub subject: Option<String>,
    pub body: Option<String>,
}

pub struct ReportExporter<S> {
    store: Arc<S>,
    resolver: TemplateResolver,
    renderer: Arc<dyn DocumentRenderer>,
    mail: Arc<dyn MailTransport>,
    printer: Arc<dyn PrintSpooler>,
    output_dir: PathBuf,
    from_address: String,
    timeout: Duration,
    span: Span,
}

impl<S> ReportExporter<S>
where
    S: ReportStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        resolver: TemplateResolver,
        mail: Arc<dyn MailTransport>,
        printer: Arc<dyn PrintSpooler>,
        config: &ExportConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            renderer: Arc::new(HtmlRenderer),
            mail,
            printer,
            output_dir: config.output_dir.clone(),
            from_address: config.from_address.clone(),
            timeout: config.channel_timeout(),
            span: info_span!("report_export"),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Write the rendered report into the export directory. Without a
    /// filename the file is named `<report_type>-<report_id>.<ext>`.
    pub async fn export_to_file(
        &self,
        id: &ReportId,
        filename: Option<&str>,
    ) -> Result<ExportReceipt, ExportError> {
        let channel = ExportChannel::File;
        let requested = filename
            .map(sanitize_filename)
            .transpose()
            .map_err(|reason| ExportChannelError::rejected(channel, reason))?;

        let (report, binary) = self.render(id).await?;
        let name = with_extension(
            requested.unwrap_or_else(|| default_filename(&report)),
            binary.extension,
        );
        let dir = self.output_dir.clone();
        let path = dir.join(&name);

        let written = path.clone();
        let bytes = binary.bytes.clone();
        self.dispatch(channel, id, async move {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| format!("cannot create {}: {err}", dir.display()))?;
            tokio::fs::write(&written, &bytes)
                .await
                .map_err(|err| format!("cannot write {}: {err}", written.display()))
        })
        .await?;

        Ok(self.receipt(id, channel, path.display().to_string(), &binary))
    }

    /// Email the rendered report as an attachment. The address is checked
    /// before the report is loaded.
    pub async fn export_to_email(
        &self,
        id: &ReportId,
        address: &str,
        options: EmailOptions,
    ) -> Result<ExportReceipt, ExportError> {
        let channel = ExportChannel::Email;
        let address = address.trim();
        if !is_valid_email(address) {
            return Err(ExportChannelError::rejected(
                channel,
                format!("invalid recipient address '{address}'"),
            )
            .into());
        }

        let (report, binary) = self.render(id).await?;
        let document_title = report.report_type().label();
        let message = EmailMessage {
            from: self.from_address.clone(),
            to: address.to_string(),
            subject: options
                .subject
                .filter(|subject| !subject.trim().is_empty())
                .unwrap_or_else(|| default_subject(&report)),
            body: options
                .body
                .unwrap_or_else(|| format!("Attached is the {document_title} report.")),
            attachment: self.attachment(&report, &binary),
        };

        let mail = Arc::clone(&self.mail);
        self.dispatch(channel, id, async move {
            mail.send(message).await.map_err(|err| err.to_string())
        })
        .await?;

        Ok(self.receipt(id, channel, address.to_string(), &binary))
    }

    pub async fn export_to_print(&self, id: &ReportId) -> Result<ExportReceipt, ExportError> {
        let channel = ExportChannel::Print;
        let (report, binary) = self.render(id).await?;
        let job = PrintJob {
            title: default_subject(&report),
            document: self.attachment(&report, &binary),
        };

        let printer = Arc::clone(&self.printer);
        let job_id = self
            .dispatch(channel, id, async move {
                printer.submit(job).await.map_err(|err| err.to_string())
            })
            .await?;

        Ok(self.receipt(id, channel, job_id, &binary))
    }

    async fn render(&self, id: &ReportId) -> Result<(Report, RenderedBinary), ExportError> {
        let report = self.store.get_by_id(id).await?;
        let document = self.resolver.resolve(&report).await;
        let binary = self.renderer.render(&document)?;
        Ok((report, binary))
    }

    async fn dispatch<T, F>(
        &self,
        channel: ExportChannel,
        id: &ReportId,
        work: F,
    ) -> Result<T, ExportChannelError>
    where
        F: Future<Output = Result<T, String>>,
    {
        let outcome = match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(ExportChannelError::failed(channel, reason)),
            Err(_) => Err(ExportChannelError::Timeout {
                channel,
                after: self.timeout,
            }),
        };
        match &outcome {
            Ok(_) => info!(parent: &self.span, report_id = %id, %channel, "report exported"),
            Err(err) => warn!(parent: &self.span, report_id = %id, %channel, "{err}"),
        }
        outcome
    }

    fn attachment(&self, report: &Report, binary: &RenderedBinary) -> Attachment {
        Attachment {
            filename: with_extension(default_filename(report), binary.extension),
            mime: binary.mime.to_string(),
            bytes: binary.bytes.clone(),
        }
    }

    fn receipt(
        &self,
        id: &ReportId,
        channel: ExportChannel,
        destination: String,
        binary: &RenderedBinary,
    ) -> ExportReceipt {
        ExportReceipt {
            report_id: id.clone(),
            channel,
            destination,
            bytes: binary.bytes.len(),
            mime: binary.mime.to_string(),
        }
    }
}

fn default_filename(report: &Report) -> String {
    format!("{}-{}", report.report_type().tag(), report.id)
}

fn default_subject(report: &Report) -> String {
    match &report.project_snapshot {
        Some(project) => format!("{} - {}", report.report_type().label(), project.name),
        None => report.report_type().label().to_string(),
    }
}

/// The written bytes decide the extension; a differing one the caller typed
/// is replaced rather than kept.
fn with_extension(name: String, extension: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((_, current)) if current.eq_ignore_ascii_case(extension) => return name,
        Some((stem, current)) if current.chars().all(|c| c.is_ascii_alphanumeric()) => stem,
        _ => name.as_str(),
    };
    format!("{stem}.{extension}")
}

/// Accepts a bare file name; anything that could escape the export
/// directory is rejected.
pub fn sanitize_filename(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("filename must not be blank".to_string());
    }
    if name.contains(['/', '\\']) || name.contains("..") || name.starts_with('.') {
        return Err(format!("filename '{name}' must not contain path components"));
    }
    if name.chars().any(char::is_control) {
        return Err("filename must not contain control characters".to_string());
    }
    Ok(name.to_string())
}

pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}
