use frame_support::dispatch::DispatchResult;
use frame_system::pallet_prelude::BlockNumberFor;
use sp_runtime::DispatchError;
use sp_std::vec::Vec as SpVec;

use utils::{
	traits::{LifecycleEvent, SigningInfo, StakeLedger, ValidatorLifecycle},
	BondStatus,
};

use super::{Config, Event, Pallet, WatchedValidators};

impl<T: Config> ValidatorLifecycle<T::AccountId> for Pallet<T> {
	fn on_lifecycle_event(event: &LifecycleEvent<T::AccountId>) -> DispatchResult {
		match event {
			LifecycleEvent::BeforeValidatorModified(validator) => {
				if !WatchedValidators::<T>::contains_key(validator) {
					let now = frame_system::Pallet::<T>::block_number();
					WatchedValidators::<T>::insert(validator, now);
				}
			},
			LifecycleEvent::BeforeValidatorSlashed { validator, fraction } => {
				log::debug!("validator {validator:?} is about to be slashed by {fraction:?}");
			},
			_ => {},
		}

		Ok(())
	}
}

impl<T: Config> Pallet<T> {
	/// Reconciles the power index with validators the ledger touched in earlier blocks,
	/// then finishes pending unbondings. Returns the (reads, writes) performed.
	pub(crate) fn sweep(now: BlockNumberFor<T>) -> Result<(u64, u64), DispatchError> {
		let mut reads = 0u64;
		let mut writes = 0u64;
		let mut changed = false;

		let watched: SpVec<_> =
			WatchedValidators::<T>::iter().filter(|(_, seen_at)| *seen_at < now).collect();

		for (operator, _) in watched {
			WatchedValidators::<T>::remove(&operator);
			reads += 2;
			writes += 1;

			let gone = T::StakeLedger::validator(&operator).map_or(true, |v| v.jailed);

			if gone && T::StakeLedger::last_validator_power(&operator).is_some() {
				T::StakeLedger::remove_last_validator_power(&operator)?;
				writes += 1;
				changed = true;
			}
		}

		for mut validator in T::StakeLedger::validators() {
			reads += 2;

			if validator.status == BondStatus::Unbonding {
				validator.status = BondStatus::Unbonded;
				T::StakeLedger::set_validator(&validator)?;
				writes += 1;
				changed = true;
			}

			if validator.status == BondStatus::Unbonded &&
				T::StakeLedger::last_validator_power(&validator.operator).is_some()
			{
				T::StakeLedger::remove_last_validator_power(&validator.operator)?;
				T::SigningInfo::clear(&validator.operator)?;
				writes += 2;
				changed = true;

				Self::deposit_event(Event::<T>::ValidatorUnbonded(validator.operator));
			}
		}

		if changed {
			Self::update_total_power()?;
			writes += 1;
		}

		Ok((reads, writes))
	}
}
