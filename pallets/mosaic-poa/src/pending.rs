use frame_support::{dispatch::DispatchResult, ensure};
use sp_std::vec::Vec as SpVec;

use utils::traits::StakeLedger;

use super::{Config, Error, PendingValidator, PendingValidators, Pallet};

impl<T: Config> Pallet<T> {
	pub(crate) fn add_pending(
		operator: &T::AccountId,
		pending: PendingValidator<T::Balance>,
	) -> DispatchResult {
		ensure!(!PendingValidators::<T>::contains_key(operator), Error::<T>::AlreadyPending);

		PendingValidators::<T>::insert(operator, pending);

		Ok(())
	}

	pub(crate) fn do_remove_pending(operator: &T::AccountId) -> DispatchResult {
		PendingValidators::<T>::take(operator).ok_or(Error::<T>::NotPending)?;

		Ok(())
	}

	pub fn pending_validator(operator: &T::AccountId) -> Option<PendingValidator<T::Balance>> {
		PendingValidators::<T>::get(operator)
	}

	pub fn pending_validators() -> SpVec<(T::AccountId, PendingValidator<T::Balance>)> {
		PendingValidators::<T>::iter().collect()
	}

	pub fn is_pending(operator: &T::AccountId) -> bool {
		PendingValidators::<T>::contains_key(operator)
	}

	/// The key is claimed either by a ledger validator or by another candidate.
	pub(crate) fn consensus_key_in_use(key: &[u8]) -> bool {
		T::StakeLedger::validator_by_consensus_key(key).is_some() ||
			PendingValidators::<T>::iter_values().any(|p| p.consensus_key == key)
	}
}
