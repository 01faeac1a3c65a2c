//! Merkle Distribution Engine
//!
//! Off-chain half of a Merkle-based token distributor. An allocation list is
//! validated, committed to a single 32-byte root, and served back to
//! recipients as per-address claim proofs that an on-chain verifier accepts.
//!
//! # Components
//!
//! - [`AllocationValidator`]: rejects malformed allocation lists before anything is built
//! - [`leaf`]: the v1 leaf encoding, `keccak256(uint256 index || address || uint256 amount)`
//! - [`MerkleTree`]: sorted-pair Keccak tree with odd-node duplication
//! - [`DistributionManager`]: lifecycle, eligibility and proof retrieval
//! - [`Reconciler`]: pulls claim flags, timing and status from the chain
//!
//! # Example
//!
//! ```no_run
//! use merkle_distributor::{AllocationInput, AllocationValidator, merkle};
//!
//! let inputs = vec![AllocationInput::new("0x000000000000000000000000000000000000000a", 100)];
//! let validated = AllocationValidator::default().validated(&inputs).unwrap();
//! let built = merkle::build(validated.as_slice()).unwrap();
//! println!("root: {}", merkle_distributor::utils::hash_to_hex(&built.root()));
//! ```

pub mod cache;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod ethereum;
pub mod files;
pub mod leaf;
pub mod manager;
pub mod merkle;
pub mod store;
pub mod sync;
pub mod types;
pub mod utils;
pub mod validator;

#[cfg(test)]
mod merkle_tests;

pub use chain::{CachedChainReader, ChainEvent, ChainReader, InMemoryChain};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{DistributorError, Result};
pub use ethereum::Address;
pub use manager::{CreatedDistribution, DistributionManager};
pub use merkle::{MerkleProof, MerkleTree};
pub use store::{DistributionStore, MemoryStore};
pub use sync::Reconciler;
pub use types::{
    AllocationInput, ClaimProof, Distribution, DistributionFilter, DistributionStatus, Eligibility,
    Leaf, VaultType,
};
pub use validator::{AllocationValidator, ValidatedAllocations};
