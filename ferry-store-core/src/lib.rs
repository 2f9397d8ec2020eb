// SPDX-License-Identifier: MIT

pub mod derivation;
pub mod hash;
pub mod store_path;

pub use derivation::{Derivation, DerivationOutput, ParseDerivationError};
pub use hash::{FileHash, HashEncoding, ParseHashError};
pub use store_path::{FullStorePath, ParseStorePathError, PathSet, StoreDir, StorePath};
