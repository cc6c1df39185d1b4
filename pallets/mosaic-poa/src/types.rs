use frame_support::{
	pallet_prelude::{Decode, Encode, TypeInfo},
	sp_runtime::RuntimeDebug,
	DefaultNoBound,
};
use sp_runtime::traits::Zero;
use sp_std::vec::Vec as SpVec;

use utils::{CommissionRates, ConsensusKey, Description, ValidatorRecord};

/// On-chain authority configuration.
#[derive(
	Clone,
	PartialEq,
	Eq,
	Encode,
	Decode,
	RuntimeDebug,
	TypeInfo,
	DefaultNoBound,
	serde::Serialize,
	serde::Deserialize,
)]
pub struct PoaParams<AccountId> {
	/// Any single admin is sufficient authority.
	pub admins: SpVec<AccountId>,
	/// Accounts allowed to register as candidates. Empty means anyone may register.
	pub whitelist: SpVec<AccountId>,
	/// Validators may remove themselves without an admin.
	pub allow_validator_self_exit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidParams {
	EmptyAdminSet,
	DuplicateAdmin,
}

impl<AccountId: PartialEq> PoaParams<AccountId> {
	pub fn is_admin(&self, account: &AccountId) -> bool {
		self.admins.contains(account)
	}

	pub fn may_register(&self, account: &AccountId) -> bool {
		self.whitelist.is_empty() || self.whitelist.contains(account)
	}

	pub fn validate(&self) -> Result<(), InvalidParams> {
		if self.admins.is_empty() {
			return Err(InvalidParams::EmptyAdminSet);
		}

		for (i, admin) in self.admins.iter().enumerate() {
			if self.admins[i + 1..].contains(admin) {
				return Err(InvalidParams::DuplicateAdmin);
			}
		}

		Ok(())
	}
}

/// A registered candidate holding neither tokens nor power.
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub struct PendingValidator<Balance> {
	pub description: Description,
	pub consensus_key: ConsensusKey,
	pub commission: CommissionRates,
	pub min_self_delegation: Balance,
}

impl<Balance: Zero> PendingValidator<Balance> {
	pub fn into_validator<AccountId>(
		self,
		operator: AccountId,
	) -> ValidatorRecord<AccountId, Balance> {
		ValidatorRecord::new(
			operator,
			self.consensus_key,
			self.description,
			self.commission,
			self.min_self_delegation,
		)
	}
}

#[derive(
	Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo, serde::Serialize, serde::Deserialize,
)]
pub struct GenesisValidator<AccountId, Balance> {
	pub operator: AccountId,
	pub consensus_key: ConsensusKey,
	/// Power in tokens, reduced to consensus power by the ledger's power reduction.
	pub power: Balance,
	pub commission: CommissionRates,
	pub description: Description,
}
