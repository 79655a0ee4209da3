//! ClientDesk - local client portal data layer
//!
//! ClientDesk keeps a client portal's data in a flat key-value store:
//! consultation requests submitted by prospects, and the state of one
//! client project (progress, timeline, activity feed). A polling notifier
//! re-reads the project on a fixed interval and pushes it to subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        PortalContext                         │
//! │  ┌──────────────────────┐      ┌──────────────────────────┐  │
//! │  │     RecordStore      │◄─────│     ChangeNotifier       │  │
//! │  │  - consultations     │ poll │  - subscriber registry   │  │
//! │  │  - project singleton │      │  - interval timer        │  │
//! │  └──────────┬───────────┘      └──────────────────────────┘  │
//! │             │                                                │
//! │  ┌──────────▼───────────┐      ┌──────────────────────────┐  │
//! │  │    KeyValueStore     │      │   presentation helpers   │  │
//! │  │  memory │ file       │      │  toasts, dates, "ago"    │  │
//! │  └──────────────────────┘      └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: key-value backends holding JSON text
//! - [`records`]: typed record store and record types
//! - [`notifier`]: publish/subscribe and project polling
//! - [`presentation`]: toast, date and relative-time formatting
//! - [`portal`]: the context object tying store and notifier together
//! - [`config`]: Configuration management

pub mod config;
pub mod error;
pub mod notifier;
pub mod portal;
pub mod presentation;
pub mod records;
pub mod storage;

pub use config::ClientDeskConfig;
pub use error::{Error, Result};
pub use portal::PortalContext;
