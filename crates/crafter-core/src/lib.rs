//! Service kernel for hireable crafter workers: per-worker FIFO work
//! ledgers, a mutual-exclusion forge registry, deterministic price
//! quoting, two-party trade sessions, and policy-driven settlement,
//! driven by a tick loop behind an injected host boundary.

pub mod forge;
pub mod host;
pub mod job;
pub mod negotiation;
pub mod pricing;
pub mod settlement;
pub mod store;
pub mod workbook;
pub mod world;

pub use forge::{AccessRuling, ForgeError, ForgeRegistry};
pub use host::{MemoryHost, WorldHost};
pub use job::{DonationJob, ImprovementJob, Job};
pub use negotiation::{SessionError, SessionOutcome, SessionState, TradeSession};
pub use settlement::{PayoutRecord, PayoutSplit, SettlementError, SettlementLedger, ShopAccount};
pub use store::{AuthorityState, SqliteWorkStore, StoreError};
pub use workbook::{WorkBook, WorkBookError};
pub use world::{Crafter, CrafterSnapshot, CrafterWorld, TradeError, QL_GAIN_PER_TICK};
