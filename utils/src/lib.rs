#![no_std]
pub mod lifecycle;
pub mod staking;
pub mod traits {
	pub use super::{lifecycle::*, staking::*};
}

pub use staking::{
	BondStatus, CommissionRates, ConsensusKey, Delegation, Description, StakingParams,
	ValidatorRecord,
};
