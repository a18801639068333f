//! Block volume engine
//!
//! Content-addressed block volumes: each block is stored as one container
//! entry named after its hash, next to a small JSON manifest describing how
//! the volume was written.
//!
//! ## Layers
//!
//! - [`filename`] - hash bytes to block id (URL-safe base64) and back
//! - [`hash`] - the SHA-256 [`ContentHash`](hash::ContentHash) newtype
//! - [`timestamp`] - compact `yyyyMMddTHHmmssZ` timestamps
//! - [`manifest`] - manifest serialization and validation
//! - [`naming`] - remote volume file names
//! - [`blocklist`] - blocks that list other blocks
//! - [`container`] - container codecs ([`container::zipfile`] by default)
//! - [`encryption`] - whole-file encryption modules
//! - [`writer`] / [`reader`] - block volume writer and reader
//! - [`transfer`] - staging volumes for upload and after download
//!
//! ## Volume layout
//!
//! ```text
//! backup-b1f0c...e9.zip
//! ├── manifest                 {"Version":1,"Created":...,"Blocksize":102400,...}
//! ├── LCa0a2j_xo_5m0U8HTBBNBNCLXBkg7-g-YpeiGJm564=
//! ├── ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0=
//! └── ...
//! ```

pub mod blocklist;
pub mod config;
pub mod container;
pub mod encryption;
pub mod error;
pub mod filename;
pub mod hash;
pub mod manifest;
pub mod naming;
pub mod reader;
pub mod timestamp;
pub mod transfer;
pub mod writer;
