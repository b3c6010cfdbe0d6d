// src/notify/email.rs
use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use crate::derive::{CustomsDuty, Derivation, SovereignPricing};
use crate::extract::Karat;
use crate::ingest::types::PriceQuote;
use crate::report::ReportDocument;

const DEFAULT_SMTP_PORT: u16 = 587;
const REQUIRED_VARS: [&str; 5] = [
    "SMTP_HOST",
    "SMTP_USER",
    "SMTP_PASS",
    "REPORT_EMAIL_FROM",
    "REPORT_EMAIL_TO",
];

/// SMTP relay and addressing, read from the environment only.
#[derive(Clone)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pass: String,
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl EmailSettings {
    /// `Ok(None)` when any required variable is unset or blank: e-mail is then
    /// disabled rather than failing the run. Present but malformed values
    /// (bad port, unparsable address) are errors.
    pub fn from_lookup<F>(get: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|k| fetch(*k).is_none())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "e-mail disabled: SMTP settings incomplete");
            return Ok(None);
        }
        let value = |k: &str| fetch(k).ok_or_else(|| anyhow!("{k} missing"));

        let port = match fetch("SMTP_PORT") {
            Some(p) => p.parse::<u16>().with_context(|| format!("invalid SMTP_PORT {p:?}"))?,
            None => DEFAULT_SMTP_PORT,
        };
        let from_raw = value("REPORT_EMAIL_FROM")?;
        let from: Mailbox = from_raw
            .parse()
            .with_context(|| format!("invalid REPORT_EMAIL_FROM {from_raw:?}"))?;
        let to = value("REPORT_EMAIL_TO")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Mailbox>()
                    .with_context(|| format!("invalid REPORT_EMAIL_TO entry {s:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self {
            host: value("SMTP_HOST")?,
            port,
            user: value("SMTP_USER")?,
            pass: value("SMTP_PASS")?,
            from,
            to,
        }))
    }

    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSender {
    /// STARTTLS relay with credentials.
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let creds = Credentials::new(settings.user, settings.pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .with_context(|| format!("invalid SMTP_HOST {:?}", settings.host))?
            .port(settings.port)
            .credentials(creds)
            .build();
        Ok(Self {
            mailer,
            from: settings.from,
            to: settings.to,
        })
    }

    pub fn from_env() -> Result<Option<Self>> {
        EmailSettings::from_env()?.map(Self::new).transpose()
    }

    pub fn build_message(&self, doc: &ReportDocument) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(doc));
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .header(header::ContentType::TEXT_HTML)
            .body(render_html(doc))
            .context("build email")
    }

    pub async fn send_report(&self, doc: &ReportDocument) -> Result<()> {
        let msg = self.build_message(doc)?;
        self.mailer.send(msg).await.context("send email")?;
        tracing::info!(recipients = self.to.len(), "report e-mail sent");
        Ok(())
    }
}

pub fn subject(doc: &ReportDocument) -> String {
    format!("Gold Price Report - {}", doc.created_at.format("%Y-%m-%d %H:%M"))
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s).to_string()
}

fn money(v: f64) -> String {
    format!("{v:.2}")
}

fn unit_label(q: &PriceQuote) -> String {
    format!("{}/{}", q.currency(), q.unit().label())
}

fn prices_section(out: &mut String, doc: &ReportDocument) {
    // One table per (location, currency/unit) so AED/gram and INR/10gm never share columns.
    let mut groups: BTreeMap<(String, String), Vec<(&String, &PriceQuote)>> = BTreeMap::new();
    for (id, q) in &doc.sources {
        groups
            .entry((q.location().to_string(), unit_label(q)))
            .or_default()
            .push((id, q));
    }
    for ((location, unit), rows) in groups {
        let _ = write!(out, "<h2>Current prices - {}</h2><table><tr><th>Source</th>", esc(&location));
        for k in Karat::ALL {
            let _ = write!(out, "<th>{} ({})</th>", k.key().to_uppercase(), esc(&unit));
        }
        out.push_str("</tr>");
        for (id, q) in rows {
            let _ = write!(out, "<tr><td>{}</td>", esc(id));
            for k in Karat::ALL {
                let cell = q.price(k).map(money).unwrap_or_else(|| "-".into());
                let _ = write!(out, "<td>{cell}</td>");
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>");
    }
}

fn sovereign_row(out: &mut String, key: &str, p: &SovereignPricing) {
    let making_tax = p.making_tax.map(money).unwrap_or_else(|| "-".into());
    let _ = write!(
        out,
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{making_tax}</td><td>{}</td><td class=\"highlight\">{}</td></tr>",
        esc(key),
        p.grams,
        money(p.base_price),
        money(p.making_charge),
        money(p.tax),
        money(p.total),
    );
}

fn customs_row(out: &mut String, c: &CustomsDuty) {
    let _ = write!(
        out,
        "<tr><td>{:?}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.0}%</td><td class=\"highlight\">{}</td><td>{}</td><td>{}</td></tr>",
        c.channel,
        c.grams,
        money(c.gold_value),
        money(c.exemption_threshold),
        money(c.taxable_amount),
        c.duty_rate_applied * 100.0,
        money(c.customs_duty),
        money(c.gst_on_duty),
        money(c.total_with_gst),
    );
}

/// HTML body: source prices, sovereign breakdowns, customs figures.
pub fn render_html(doc: &ReportDocument) -> String {
    let mut out = String::with_capacity(8 * 1024);
    out.push_str(
        "<html><head><style>\
         body{font-family:Arial,sans-serif}\
         table{border-collapse:collapse;margin:10px 0}\
         th,td{border:1px solid #ddd;padding:6px 10px;text-align:right}\
         th{background:#f4c542}\
         .highlight{font-weight:bold}\
         </style></head><body>",
    );
    let _ = write!(
        out,
        "<h1>Gold Price Report</h1><p><strong>Generated:</strong> {}</p>",
        doc.created_at.to_rfc3339()
    );

    if doc.sources.is_empty() {
        out.push_str("<p>No source answered during this run.</p>");
    } else {
        prices_section(&mut out, doc);
    }

    let sovereign: Vec<_> = doc
        .calculations
        .iter()
        .filter_map(|(k, d)| match d {
            Derivation::Sovereign(p) => Some((k, p)),
            Derivation::Customs(_) => None,
        })
        .collect();
    if !sovereign.is_empty() {
        out.push_str(
            "<h2>Retail price incl. making charges and tax</h2><table><tr><th>Entry</th>\
             <th>Grams</th><th>Base</th><th>Making</th><th>Making tax</th><th>Tax</th>\
             <th class=\"highlight\">Total</th></tr>",
        );
        for (k, p) in sovereign {
            sovereign_row(&mut out, k, p);
        }
        out.push_str("</table>");
    }

    let customs: Vec<_> = doc
        .calculations
        .values()
        .filter_map(|d| match d {
            Derivation::Customs(c) => Some(c),
            Derivation::Sovereign(_) => None,
        })
        .collect();
    if !customs.is_empty() {
        out.push_str(
            "<h2>Customs duty</h2><table><tr><th>Channel</th><th>Grams</th><th>Gold value</th>\
             <th>Exemption</th><th>Taxable</th><th>Rate</th><th class=\"highlight\">Duty</th>\
             <th>GST on duty</th><th>Total with GST</th></tr>",
        );
        for c in customs {
            customs_row(&mut out, c);
        }
        out.push_str(
            "</table><p><small>Note: GST on customs duty is optional and depends on the \
             customs officer.</small></p>",
        );
    }

    out.push_str(
        "<p><small>This report is auto-generated. Prices are fetched live and may vary.</small></p>\
         </body></html>",
    );
    out
}
