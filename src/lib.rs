//! # wrmon - WS-Management monitoring client
//!
//! wrmon queries Windows hosts for monitoring data (CPU, memory, disks,
//! services, uptime) over the WS-Management protocol, authenticated and
//! encrypted with NTLM at the message layer. The transport is plain
//! HTTP; confidentiality comes from sealing every SOAP document with the
//! negotiated security context.
//!
//! ## Core Concepts
//!
//! - **Session**: the HTTP connection plus the NTLM security context;
//!   performs the negotiation handshake and per-message wrap/unwrap
//! - **Envelope**: one outgoing SOAP request with WS-Addressing headers
//!   and a fresh MessageID, correlated against the response's RelatesTo
//! - **Enumeration**: the sole data-access pattern; Enumerate opens a
//!   server-side cursor, Pull drains it batch by batch into one
//!   aggregated result document
//! - **Query Context**: a WQL query bound to a namespace, with the
//!   target class's CIM schema fetched once and cached
//! - **CIM model**: schema-driven typed decoding of result items into
//!   class instances with native scalar and array values
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     check tools (CLI)                   │
//! │       cpu / memory / disk / service / uptime / wql      │
//! └─────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌─────────────────────────┐   ┌─────────────────────────┐
//! │      Query Context      │──▶│       CIM model         │
//! │  (WQL + cached schema)  │   │ (typed class instances) │
//! └─────────────────────────┘   └─────────────────────────┘
//!                             │
//!                             ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      WsmanClient                        │
//! │     envelopes, correlation, Enumerate/Pull paging       │
//! └─────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Session                          │
//! │   NTLM negotiation, sealing, multipart framing, HTTP    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use wrmon::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> wrmon::error::Result<()> {
//!     let credentials = NtlmCredentials::new("DOMAIN\\monitor", "secret");
//!     let mut session = Session::new(
//!         endpoint_url("winserver.example.com", 5985),
//!         credentials,
//!         Duration::from_secs(10),
//!     )?;
//!     session.login().await?;
//!
//!     let mut client = WsmanClient::new(session);
//!     let mut ctx = QueryContext::new(
//!         &mut client,
//!         "root/cimv2",
//!         "SELECT * FROM Win32_OperatingSystem",
//!     )
//!     .await?;
//!     ctx.run(&mut client).await?;
//!
//!     println!("free: {} KB", ctx.get_integer("FreePhysicalMemory")?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod cim;
pub mod error;
pub mod nagios;
pub mod protocol;
pub mod transport;
pub mod wql;
pub mod xml;

/// Convenient re-exports of the types most callers need.
pub mod prelude {
    pub use crate::cim::{ClassInstance, ClassInstanceSet, ClassSchema, CimScalar, CimType};
    pub use crate::error::{Result, WrError};
    pub use crate::protocol::WsmanClient;
    pub use crate::transport::ntlm::NtlmCredentials;
    pub use crate::transport::{endpoint_url, Session, Transport};
    pub use crate::wql::QueryContext;
    pub use crate::xml::Document;
}
