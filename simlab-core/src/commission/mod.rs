//! Commission & margin model — pure money arithmetic per instrument class.
//!
//! Nothing here mutates state. The ledger calls into [`CommissionModel`] for
//! every figure it books, so all rounding happens in one place.

pub mod model;
pub mod money;
pub mod profile;

pub use model::{CommissionModel, ProfileBook};
pub use money::MoneyPolicy;
pub use profile::{
    CommissionKind, CommissionProfile, InterestTerms, MarginRequirement, ProfileKind, Settlement,
};
