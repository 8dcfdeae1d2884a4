//! # cpix
//!
//! A pure Rust implementation of CPIX (Content Protection Information
//! Exchange), the XML document format used to exchange content encryption
//! keys, usage policy and DRM signaling between packaging systems and
//! key/DRM services.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - Read and write CPIX documents
//! - Per-recipient envelope encryption of content keys
//!   (AES-256-CBC + HMAC-SHA-512, RSA-OAEP key wrapping)
//! - Canonical-XML digital signatures over the document or individual
//!   entity lists (RSASSA-PKCS1-v1.5 with SHA-512)
//! - Usage-rule based content-key resolution
//!
//! ## Example
//!
//! ```
//! use cpix::{ContentKey, ContentKeyContext, Document, MediaType, UsageRule, VideoFilter};
//! use uuid::Uuid;
//!
//! # fn main() -> cpix::Result<()> {
//! let mut document = Document::new();
//!
//! let kid = Uuid::new_v4();
//! document.add_content_key(ContentKey::with_value(kid, vec![0u8; 16]))?;
//!
//! let mut rule = UsageRule::new(kid);
//! rule.video_filters.push(VideoFilter::any());
//! document.add_usage_rule(rule)?;
//!
//! let mut buffer = Vec::new();
//! document.save(&mut buffer)?;
//!
//! let reloaded = Document::load(buffer.as_slice(), &[])?;
//! let context = ContentKeyContext {
//!     media_type: Some(MediaType::Video),
//!     ..ContentKeyContext::new()
//! };
//! assert_eq!(reloaded.resolve_content_key(&context)?.kid, kid);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod model;

mod canonical;
mod collection;
mod crypto;
mod document;
mod parser;
mod resolve;
mod schema;
mod validator;
mod writer;
mod xmltree;

pub use collection::{CollectionEntity, CollectionKind, EntityCollection};
pub use crypto::{Certificate, DecryptionKey, MIN_RSA_KEY_BITS, Signer};
pub use document::Document;
pub use error::{Error, Result};
pub use model::{
    AudioFilter, BitrateFilter, ContentKey, ContentKeyPeriod, CryptoPeriodFilter, DrmSystem,
    EncryptionScheme, KeyPeriodFilter, LabelFilter, Recipient, TimeFilter, UsageRule, VideoFilter,
};
pub use resolve::{ContentKeyContext, MediaType};
