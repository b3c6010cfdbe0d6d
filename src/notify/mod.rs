// src/notify/mod.rs
//! Report delivery. Only e-mail for now; it stays disabled unless the SMTP
//! environment is complete.

pub mod email;

pub use email::{render_html, subject, EmailSender, EmailSettings};
