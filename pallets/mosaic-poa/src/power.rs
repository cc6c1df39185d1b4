use frame_support::{dispatch::DispatchResult, ensure, traits::Get};
use sp_runtime::{
	traits::{One, SaturatedConversion, Zero},
	DispatchError, PerThing, Perbill,
};

use utils::{
	traits::{LifecycleEvent, SigningInfo, StakeLedger},
	BondStatus, Delegation, ValidatorRecord,
};

use super::{Config, Error, Event, Pallet};

impl<T: Config> Pallet<T> {
	/// Reduces a token amount to consensus power, rounding down.
	pub fn tokens_to_consensus_power(tokens: T::Balance) -> Result<u64, DispatchError> {
		let reduction = T::StakeLedger::power_reduction().saturated_into::<u128>();
		ensure!(reduction != 0, Error::<T>::InvalidPowerReduction);

		let power = tokens.saturated_into::<u128>() / reduction;

		u64::try_from(power).map_err(|_| Error::<T>::PowerOverflow.into())
	}

	/// A single safe change may move at most `MaxPowerChange` of the current total power.
	pub(crate) fn ensure_power_change_safe(
		validator: &T::AccountId,
		power: T::Balance,
	) -> DispatchResult {
		let target = Self::tokens_to_consensus_power(power)?;
		let current = T::StakeLedger::last_validator_power(validator).unwrap_or(0);
		let delta = target.abs_diff(current);

		if delta == 0 {
			return Ok(());
		}

		let total = T::StakeLedger::total_power();
		let ceiling = T::MaxPowerChange::get();

		let allowed = u128::from(ceiling.deconstruct()) * u128::from(total);
		let requested = u128::from(delta) * u128::from(Perbill::ACCURACY);

		log::debug!(
			"power change of {validator:?}: {current} -> {target} (total {total}, ceiling {ceiling:?})"
		);

		ensure!(total != 0 && requested <= allowed, Error::<T>::UnsafePowerChange);

		Ok(())
	}

	/// Rewrites the validator's stake so that it is backed by exactly `power` tokens.
	/// Zero power starts unbonding; the begin-block sweep finishes it.
	pub(crate) fn set_poa_power(
		operator: &T::AccountId,
		power: T::Balance,
	) -> Result<ValidatorRecord<T::AccountId, T::Balance>, DispatchError> {
		let mut validator =
			T::StakeLedger::validator(operator).ok_or(Error::<T>::ValidatorNotFound)?;

		let previous_power = T::StakeLedger::last_validator_power(operator);
		let new_power = Self::tokens_to_consensus_power(power)?;

		T::StakeLedger::set_delegation(&Delegation {
			delegator: Self::delegator_of(operator),
			validator: operator.clone(),
			shares: power,
		})?;

		validator.tokens = power;
		validator.delegator_shares = power;

		if power.is_zero() {
			// Keeps the operator from self-bonding back in.
			if !Self::is_genesis() {
				validator.min_self_delegation += One::one();
			}

			validator.status = BondStatus::Unbonding;
			validator.unbonding_height = Self::current_height();
		} else {
			// Signing info was cleared when the validator left the power index.
			if validator.status == BondStatus::Unbonded && previous_power.is_none() {
				T::SigningInfo::initialize(
					operator,
					&validator.consensus_key,
					Self::current_height(),
				)?;
			}

			validator.status = BondStatus::Bonded;
		}

		T::StakeLedger::set_validator(&validator)?;
		T::StakeLedger::set_validator_by_power_index(&validator)?;
		T::StakeLedger::set_last_validator_power(operator, new_power)?;

		Self::update_total_power()?;

		Self::deposit_event(Event::<T>::PowerSet {
			validator: operator.clone(),
			previous_power: previous_power.unwrap_or(0),
			new_power,
		});

		Ok(validator)
	}

	/// Recomputes the total power from the bonded, non-jailed validators.
	pub(crate) fn update_total_power() -> Result<u64, DispatchError> {
		let tokens = T::StakeLedger::validators()
			.iter()
			.filter(|v| v.is_active())
			.fold(0u128, |acc, v| acc.saturating_add(v.tokens.saturated_into::<u128>()));

		let reduction = T::StakeLedger::power_reduction().saturated_into::<u128>();
		ensure!(reduction != 0, Error::<T>::InvalidPowerReduction);

		let total = u64::try_from(tokens / reduction).map_err(|_| Error::<T>::PowerOverflow)?;
		T::StakeLedger::set_total_power(total)?;

		Ok(total)
	}

	/// Promotes a pending candidate into a ledger validator. Power is assigned by the caller.
	pub(crate) fn accept_new_validator(
		operator: &T::AccountId,
		initial_power: T::Balance,
	) -> DispatchResult {
		let pending = Self::pending_validator(operator).ok_or(Error::<T>::NotPending)?;
		let validator = pending.into_validator(operator.clone());

		T::StakeLedger::set_validator(&validator)?;
		T::StakeLedger::set_validator_by_consensus_key(&validator)?;
		T::StakeLedger::set_validator_by_power_index(&validator)?;
		T::StakeLedger::set_last_validator_power(operator, 0)?;
		T::StakeLedger::notify(&LifecycleEvent::ValidatorCreated(operator.clone()))?;

		Self::do_remove_pending(operator)?;

		T::SigningInfo::initialize(operator, &validator.consensus_key, Self::current_height())?;

		Self::deposit_event(Event::<T>::ValidatorAccepted {
			validator: operator.clone(),
			power: initial_power,
		});

		Self::update_total_power()?;

		Ok(())
	}
}
