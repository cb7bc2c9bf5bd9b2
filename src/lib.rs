//! # research-desk
//!
//! Client for a research-chat service. The core is [`controller::SessionController`],
//! which keeps one current research session consistent while updates arrive
//! from a poll loop and an optional push channel in any order.
//!
//! ```rust,ignore
//! let backend = Arc::new(HttpBackend::from_config(&cfg));
//! let mut ctl = SessionController::new(backend, cfg.poll_interval());
//! ctl.start_session("climate policy", &|_: &str| true).await?;
//! ctl.follow(|session, _| println!("{}", render_progress(session))).await;
//! ```

pub mod backend;
pub mod citations;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod render;
pub mod state;
pub mod updates;

pub use backend::{HttpBackend, ResearchBackend};
pub use controller::{Applied, Confirm, Ignored, Phase, SessionController};
pub use error::{ClientError, Result};
pub use model::{Reference, Session, SessionStatus, UpdateEvent};
