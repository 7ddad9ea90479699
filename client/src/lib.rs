//! # Tether Client
//!
//! A blocking PocketBase [`Backend`](tether_engine::Backend) for the Tether
//! engine.
//!
//! ```no_run
//! use tether_client::{Config, PocketBase};
//! use tether_engine::{ModelDescriptor, TypeSignature};
//!
//! let config = Config::from_env()?;
//! let pb = PocketBase::connect(&config)?;
//!
//! let notes = ModelDescriptor::new("Note").field("title", TypeSignature::String);
//! let result = pb.context().sync_descriptor(&notes)?;
//! println!("{:?}", result.action);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod pocketbase;

pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use pocketbase::PocketBase;
