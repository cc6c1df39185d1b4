use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::{
	dispatch::DispatchResult,
	sp_runtime::{traits::Zero, Perbill, RuntimeDebug},
};
use scale_info::TypeInfo;
use sp_std::vec::Vec as SpVec;

use crate::lifecycle::LifecycleEvent;

/// Opaque consensus public key bytes.
pub type ConsensusKey = SpVec<u8>;

#[derive(
	Copy,
	Clone,
	PartialEq,
	Eq,
	Encode,
	Decode,
	RuntimeDebug,
	TypeInfo,
	MaxEncodedLen,
	serde::Serialize,
	serde::Deserialize,
)]
pub enum BondStatus {
	Unbonded,
	Unbonding,
	Bonded,
}

#[derive(
	Default,
	Clone,
	PartialEq,
	Eq,
	Encode,
	Decode,
	RuntimeDebug,
	TypeInfo,
	serde::Serialize,
	serde::Deserialize,
)]
pub struct Description {
	pub moniker: SpVec<u8>,
	pub identity: SpVec<u8>,
	pub website: SpVec<u8>,
	pub details: SpVec<u8>,
}

#[derive(
	Default,
	Copy,
	Clone,
	PartialEq,
	Eq,
	Encode,
	Decode,
	RuntimeDebug,
	TypeInfo,
	MaxEncodedLen,
	serde::Serialize,
	serde::Deserialize,
)]
pub struct CommissionRates {
	pub rate: Perbill,
	pub max_rate: Perbill,
	pub max_change_rate: Perbill,
}

impl CommissionRates {
	pub fn new(rate: Perbill, max_rate: Perbill, max_change_rate: Perbill) -> Self {
		Self { rate, max_rate, max_change_rate }
	}

	/// The current rate and the daily change limit may not exceed the maximum rate.
	pub fn is_valid(&self) -> bool {
		self.rate <= self.max_rate && self.max_change_rate <= self.max_rate
	}
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct ValidatorRecord<AccountId, Balance> {
	pub operator: AccountId,
	pub consensus_key: ConsensusKey,
	pub jailed: bool,
	pub status: BondStatus,
	pub tokens: Balance,
	pub delegator_shares: Balance,
	pub description: Description,
	pub commission: CommissionRates,
	pub min_self_delegation: Balance,
	pub unbonding_height: u32,
}

impl<AccountId, Balance: Zero> ValidatorRecord<AccountId, Balance> {
	/// A fresh, unbonded record holding no tokens.
	pub fn new(
		operator: AccountId,
		consensus_key: ConsensusKey,
		description: Description,
		commission: CommissionRates,
		min_self_delegation: Balance,
	) -> Self {
		Self {
			operator,
			consensus_key,
			jailed: false,
			status: BondStatus::Unbonded,
			tokens: Zero::zero(),
			delegator_shares: Zero::zero(),
			description,
			commission,
			min_self_delegation,
			unbonding_height: 0,
		}
	}

	pub fn is_bonded(&self) -> bool {
		self.status == BondStatus::Bonded
	}

	/// Bonded and not jailed, i.e. counted towards the total power.
	pub fn is_active(&self) -> bool {
		self.is_bonded() && !self.jailed
	}
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct Delegation<AccountId, Balance> {
	pub delegator: AccountId,
	pub validator: AccountId,
	pub shares: Balance,
}

#[derive(
	Clone,
	PartialEq,
	Eq,
	Encode,
	Decode,
	RuntimeDebug,
	TypeInfo,
	MaxEncodedLen,
	serde::Serialize,
	serde::Deserialize,
)]
pub struct StakingParams {
	pub max_validators: u32,
	pub min_commission_rate: Perbill,
	pub unbonding_blocks: u32,
}

impl Default for StakingParams {
	fn default() -> Self {
		Self {
			max_validators: 100,
			min_commission_rate: Perbill::from_percent(0),
			unbonding_blocks: 0,
		}
	}
}

/// The delegated-stake ledger keeping validator records, delegations and the power index.
pub trait StakeLedger<AccountId, Balance> {
	fn validator(operator: &AccountId) -> Option<ValidatorRecord<AccountId, Balance>>;

	/// Fires `BeforeValidatorModified` before writing if the record already exists.
	fn set_validator(validator: &ValidatorRecord<AccountId, Balance>) -> DispatchResult;

	fn validator_by_consensus_key(key: &[u8]) -> Option<AccountId>;

	fn set_validator_by_consensus_key(
		validator: &ValidatorRecord<AccountId, Balance>,
	) -> DispatchResult;

	fn set_validator_by_power_index(validator: &ValidatorRecord<AccountId, Balance>)
		-> DispatchResult;

	fn validators() -> SpVec<ValidatorRecord<AccountId, Balance>>;

	/// Stores the delegation, replacing any other delegation to the same validator.
	fn set_delegation(delegation: &Delegation<AccountId, Balance>) -> DispatchResult;

	fn last_validator_power(operator: &AccountId) -> Option<u64>;

	fn set_last_validator_power(operator: &AccountId, power: u64) -> DispatchResult;

	fn remove_last_validator_power(operator: &AccountId) -> DispatchResult;

	fn total_power() -> u64;

	fn set_total_power(power: u64) -> DispatchResult;

	/// Tokens per unit of consensus power.
	fn power_reduction() -> Balance;

	fn params() -> StakingParams;

	fn set_params(params: StakingParams) -> DispatchResult;

	/// Forwards a lifecycle signal to every hook registered with the ledger.
	fn notify(event: &LifecycleEvent<AccountId>) -> DispatchResult;
}

/// Downtime signing records kept by the slashing subsystem.
pub trait SigningInfo<AccountId> {
	fn initialize(operator: &AccountId, consensus_key: &[u8], start_height: u32)
		-> DispatchResult;

	fn clear(operator: &AccountId) -> DispatchResult;
}

impl<AccountId> SigningInfo<AccountId> for () {
	fn initialize(
		_operator: &AccountId,
		_consensus_key: &[u8],
		_start_height: u32,
	) -> DispatchResult {
		Ok(())
	}

	fn clear(_operator: &AccountId) -> DispatchResult {
		Ok(())
	}
}
