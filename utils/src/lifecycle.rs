use codec::{Decode, Encode};
use frame_support::{pallet_prelude::DispatchResult, sp_runtime::RuntimeDebug};
use scale_info::TypeInfo;
use sp_runtime::Perbill;

/// Signals fired by the stake ledger around validator and delegation mutations.
#[derive(Clone, PartialEq, Eq, Encode, Decode, RuntimeDebug, TypeInfo)]
pub enum LifecycleEvent<AccountId> {
	ValidatorCreated(AccountId),
	/// Fired immediately before the ledger writes a validator record.
	BeforeValidatorModified(AccountId),
	ValidatorRemoved(AccountId),
	ValidatorBonded(AccountId),
	ValidatorBeginUnbonding(AccountId),
	DelegationCreated { delegator: AccountId, validator: AccountId },
	DelegationSharesModified { delegator: AccountId, validator: AccountId },
	DelegationRemoved { delegator: AccountId, validator: AccountId },
	BeforeValidatorSlashed { validator: AccountId, fraction: Perbill },
}

pub trait ValidatorLifecycle<AccountId> {
	/// Called by the stake ledger for every lifecycle signal.
	/// An error is fatal for the block being processed.
	fn on_lifecycle_event(event: &LifecycleEvent<AccountId>) -> DispatchResult;
}

#[impl_trait_for_tuples::impl_for_tuples(16)]
impl<AccountId> ValidatorLifecycle<AccountId> for Tuple {
	fn on_lifecycle_event(event: &LifecycleEvent<AccountId>) -> DispatchResult {
		for_tuples!( #( Tuple::on_lifecycle_event(event)?; )* );
		Ok(())
	}
}
