#![cfg_attr(not(feature = "std"), no_std)]
pub use admission::{
	AdmissionContext, AdmissionError, AdmissionFilter, CallKind, CheckPoaAdmission,
	CommissionLimiter, InspectCall, StakingActionFilter, StakingMessage, WithdrawRewardsFilter,
};
/// Mosaic's proof-of-authority validator governance pallet.
/// Admins assign consensus power directly instead of stake deciding it; the actual
/// bookkeeping is deferred to the stake ledger behind `Config::StakeLedger`.
/// Note: functions that take part in an admin call never commit partial effects,
/// every failure rolls back the whole transaction.
pub use pallet::*;
pub use types::{GenesisValidator, PendingValidator, PoaParams};

pub mod admission;
mod lifecycle;
mod pending;
mod power;
mod types;

#[cfg(test)]
mod mock;

use codec::Codec;
use frame_support::{
	pallet_prelude::*,
	traits::{Currency, ExistenceRequirement},
	PalletId,
};
use frame_system::pallet_prelude::*;
use sp_runtime::{
	traits::{AccountIdConversion, AtLeast32BitUnsigned, One, SaturatedConversion, Zero},
	Perbill,
};
use sp_std::vec::Vec as SpVec;

use types::InvalidParams;
use utils::{
	traits::{LifecycleEvent, SigningInfo, StakeLedger},
	CommissionRates, ConsensusKey, Description, StakingParams, ValidatorRecord,
};

#[frame_support::pallet(dev_mode)]
pub mod pallet {
	use super::*;

	#[pallet::pallet]
	pub struct Pallet<T>(_);

	/// Configure the pallet by specifying the parameters and types on which it depends.
	#[pallet::config]
	pub trait Config: frame_system::Config {
		/// Because this pallet emits events, it depends on the runtime's definition of an event.
		type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

		/// Token amounts, also used to express power before reduction.
		type Balance: Parameter
			+ Member
			+ AtLeast32BitUnsigned
			+ Codec
			+ Default
			+ Copy
			+ MaybeSerializeDeserialize
			+ MaxEncodedLen
			+ TypeInfo;

		/// Used to mint the self-bond of admitted candidates.
		type Currency: Currency<Self::AccountId, Balance = Self::Balance>;

		type StakeLedger: StakeLedger<Self::AccountId, Self::Balance>;

		type SigningInfo: SigningInfo<Self::AccountId>;

		/// Maps runtime calls onto the staking messages the admission filters understand.
		type CallInspector: InspectCall<
			<Self as frame_system::Config>::RuntimeCall,
			Self::AccountId,
			Self::Balance,
		>;

		/// The admission filter chain, usually
		/// `(StakingActionFilter<Self>, CommissionLimiter<Self>, WithdrawRewardsFilter<Self>)`.
		type AdmissionFilters: AdmissionFilter<Self>;

		/// Largest share of the total power a single safe `set_power` may move.
		#[pallet::constant]
		type MaxPowerChange: Get<Perbill>;

		#[pallet::constant]
		type MinCommissionRate: Get<Perbill>;

		#[pallet::constant]
		type MaxCommissionRate: Get<Perbill>;

		/// Whether commission bounds also apply to the genesis window.
		#[pallet::constant]
		type EnforceCommissionAtGenesis: Get<bool>;

		/// One full token in the smallest unit, the exact self-bond of a new validator.
		#[pallet::constant]
		type OneToken: Get<Self::Balance>;

		#[pallet::constant]
		type PalletId: Get<PalletId>;
	}

	#[pallet::storage]
	pub type Params<T: Config> = StorageValue<_, PoaParams<T::AccountId>, ValueQuery>;

	#[pallet::storage]
	pub type PendingValidators<T: Config> =
		StorageMap<_, Twox64Concat, T::AccountId, PendingValidator<T::Balance>, OptionQuery>;

	/// Validators the ledger was about to modify, with the block they were first seen in.
	#[pallet::storage]
	pub type WatchedValidators<T: Config> =
		StorageMap<_, Twox64Concat, T::AccountId, BlockNumberFor<T>, OptionQuery>;

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		PowerSet {
			validator: T::AccountId,
			previous_power: u64,
			new_power: u64,
		},

		ValidatorAccepted {
			validator: T::AccountId,
			power: T::Balance,
		},

		ValidatorRemoved {
			validator: T::AccountId,
			removed_by: T::AccountId,
		},

		ValidatorUnbonded(T::AccountId),

		PendingValidatorAdded(T::AccountId),

		PendingValidatorRemoved(T::AccountId),

		SelfBondMinted {
			validator: T::AccountId,
			amount: T::Balance,
		},

		ParamsUpdated,

		StakingParamsUpdated,
	}

	#[pallet::error]
	pub enum Error<T> {
		NotAdmin,
		NotAuthorized,
		NotWhitelisted,
		ValidatorNotFound,
		NotBonded,
		LastValidator,
		AlreadyPending,
		NotPending,
		AlreadyValidator,
		ConsensusKeyInUse,
		InvalidCommission,
		CommissionOutOfBounds,
		InvalidMinSelfDelegation,
		UnsafePowerChange,
		InvalidPowerReduction,
		PowerOverflow,
		EmptyAdminSet,
		DuplicateAdmin,
		DuplicateOperator,
		DuplicateConsensusKey,
	}

	impl<T> From<InvalidParams> for Error<T> {
		fn from(err: InvalidParams) -> Self {
			match err {
				InvalidParams::EmptyAdminSet => Error::<T>::EmptyAdminSet,
				InvalidParams::DuplicateAdmin => Error::<T>::DuplicateAdmin,
			}
		}
	}

	#[pallet::genesis_config]
	pub struct GenesisConfig<T: Config> {
		pub params: PoaParams<T::AccountId>,
		pub validators: SpVec<GenesisValidator<T::AccountId, T::Balance>>,
	}

	impl<T: Config> Default for GenesisConfig<T> {
		fn default() -> Self {
			Self { params: PoaParams::default(), validators: SpVec::new() }
		}
	}

	impl<T: Config> GenesisConfig<T> {
		/// Rejects duplicate operators, duplicate consensus keys and unusable params.
		pub fn validate(&self) -> Result<(), Error<T>> {
			self.params.validate().map_err(Error::<T>::from)?;

			for (i, validator) in self.validators.iter().enumerate() {
				let rest = &self.validators[i + 1..];

				ensure!(
					rest.iter().all(|other| other.operator != validator.operator),
					Error::<T>::DuplicateOperator
				);
				ensure!(
					rest.iter().all(|other| other.consensus_key != validator.consensus_key),
					Error::<T>::DuplicateConsensusKey
				);
				ensure!(validator.commission.is_valid(), Error::<T>::InvalidCommission);
			}

			Ok(())
		}
	}

	#[pallet::genesis_build]
	impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
		fn build(&self) {
			if let Err(e) = self.validate() {
				panic!("invalid poa genesis config: {e:?}");
			}

			Params::<T>::put(&self.params);

			for validator in &self.validators {
				Pallet::<T>::install_genesis_validator(validator)
					.expect("couldn't install validator on genesis; this shouldn't happen");
			}
		}
	}

	#[pallet::hooks]
	impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
		fn on_initialize(now: BlockNumberFor<T>) -> Weight {
			// Ledger failures must halt the block on every node.
			let (reads, writes) =
				Self::sweep(now).expect("stake ledger rejected the begin-block sweep");

			T::DbWeight::get().reads_writes(reads, writes)
		}
	}

	impl<T: Config> Pallet<T> {
		/// The account the self-bond is minted into before it is handed out.
		pub fn account_id() -> T::AccountId {
			T::PalletId::get().into_account_truncating()
		}

		/// The module controlled delegator backing a validator's single delegation.
		pub fn delegator_of(operator: &T::AccountId) -> T::AccountId {
			T::PalletId::get().into_sub_account_truncating(operator)
		}

		/// The first block still accepts the bootstrap transactions of the validator set.
		pub(crate) fn is_genesis() -> bool {
			frame_system::Pallet::<T>::block_number() <= One::one()
		}

		pub(crate) fn current_height() -> u32 {
			frame_system::Pallet::<T>::block_number().saturated_into::<u32>()
		}

		fn ensure_admin(origin: OriginFor<T>) -> Result<T::AccountId, DispatchError> {
			let caller = ensure_signed(origin)?;
			ensure!(Params::<T>::get().is_admin(&caller), Error::<T>::NotAdmin);
			Ok(caller)
		}

		/// Mints one token into the pallet account and moves it to the operator.
		pub(crate) fn mint_self_bond(operator: &T::AccountId) -> DispatchResult {
			let amount = T::OneToken::get();
			let minter = Self::account_id();

			// Modifies total issuance
			drop(T::Currency::deposit_creating(&minter, amount));

			T::Currency::transfer(&minter, operator, amount, ExistenceRequirement::AllowDeath)?;

			Self::deposit_event(Event::<T>::SelfBondMinted { validator: operator.clone(), amount });

			Ok(())
		}

		pub(crate) fn install_genesis_validator(
			genesis: &GenesisValidator<T::AccountId, T::Balance>,
		) -> DispatchResult {
			let validator = ValidatorRecord::new(
				genesis.operator.clone(),
				genesis.consensus_key.clone(),
				genesis.description.clone(),
				genesis.commission,
				One::one(),
			);

			T::StakeLedger::set_validator(&validator)?;
			T::StakeLedger::set_validator_by_consensus_key(&validator)?;
			T::StakeLedger::notify(&LifecycleEvent::ValidatorCreated(genesis.operator.clone()))?;
			T::SigningInfo::initialize(&genesis.operator, &genesis.consensus_key, 0)?;

			Self::set_poa_power(&genesis.operator, genesis.power)?;

			Ok(())
		}

		pub fn params() -> PoaParams<T::AccountId> {
			Params::<T>::get()
		}

		/// Current consensus power of a validator as recorded in the power index.
		pub fn consensus_power(validator: &T::AccountId) -> Option<u64> {
			T::StakeLedger::last_validator_power(validator)
		}

		/// Rebuilds a genesis config from the current state. Only bonded validators are exported.
		pub fn export_genesis() -> GenesisConfig<T> {
			let validators = T::StakeLedger::validators()
				.into_iter()
				.filter(|v| v.is_bonded())
				.map(|v| GenesisValidator {
					operator: v.operator,
					consensus_key: v.consensus_key,
					power: v.tokens,
					commission: v.commission,
					description: v.description,
				})
				.collect();

			GenesisConfig { params: Params::<T>::get(), validators }
		}
	}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Sets the power of an active or pending validator.
		/// A pending validator is promoted first.
		#[pallet::call_index(0)]
		pub fn set_power(
			origin: OriginFor<T>,
			validator: T::AccountId,
			power: T::Balance,
			unsafe_change: bool,
		) -> DispatchResult {
			Self::ensure_admin(origin)?;

			let pending = Self::is_pending(&validator);
			ensure!(
				pending || T::StakeLedger::validator(&validator).is_some(),
				Error::<T>::ValidatorNotFound
			);

			if !unsafe_change {
				Self::ensure_power_change_safe(&validator, power)?;
			}

			if pending {
				Self::accept_new_validator(&validator, power)?;
			}

			Self::set_poa_power(&validator, power)?;

			Ok(())
		}

		#[pallet::call_index(1)]
		pub fn remove_validator(origin: OriginFor<T>, validator: T::AccountId) -> DispatchResult {
			let caller = ensure_signed(origin)?;
			let params = Params::<T>::get();

			let self_exit = params.allow_validator_self_exit && caller == validator;
			ensure!(params.is_admin(&caller) || self_exit, Error::<T>::NotAuthorized);

			let record = T::StakeLedger::validator(&validator).ok_or(Error::<T>::ValidatorNotFound)?;
			ensure!(record.is_bonded(), Error::<T>::NotBonded);

			let bonded = T::StakeLedger::validators().iter().filter(|v| v.is_bonded()).count();
			ensure!(bonded > 1, Error::<T>::LastValidator);

			Self::set_poa_power(&validator, Zero::zero())?;

			Self::deposit_event(Event::<T>::ValidatorRemoved { validator, removed_by: caller });

			Ok(())
		}

		#[pallet::call_index(2)]
		pub fn remove_pending(origin: OriginFor<T>, validator: T::AccountId) -> DispatchResult {
			Self::ensure_admin(origin)?;

			Self::do_remove_pending(&validator)?;

			Self::deposit_event(Event::<T>::PendingValidatorRemoved(validator));

			Ok(())
		}

		/// Replaces the admin set, whitelist and self-exit flag at once.
		#[pallet::call_index(3)]
		pub fn update_params(origin: OriginFor<T>, params: PoaParams<T::AccountId>) -> DispatchResult {
			Self::ensure_admin(origin)?;

			params.validate().map_err(Error::<T>::from)?;
			Params::<T>::put(params);

			Self::deposit_event(Event::<T>::ParamsUpdated);

			Ok(())
		}

		/// Registers the caller as a candidate. It holds no tokens and no power until an
		/// admin sets its power.
		#[pallet::call_index(4)]
		pub fn create_validator(
			origin: OriginFor<T>,
			description: Description,
			consensus_key: ConsensusKey,
			commission: CommissionRates,
			min_self_delegation: T::Balance,
		) -> DispatchResult {
			let caller = ensure_signed(origin)?;

			ensure!(Params::<T>::get().may_register(&caller), Error::<T>::NotWhitelisted);
			ensure!(T::StakeLedger::validator(&caller).is_none(), Error::<T>::AlreadyValidator);
			ensure!(!Self::consensus_key_in_use(&consensus_key), Error::<T>::ConsensusKeyInUse);
			ensure!(commission.is_valid(), Error::<T>::InvalidCommission);
			if !Self::is_genesis() || T::EnforceCommissionAtGenesis::get() {
				admission::ensure_commission_in_band(
					commission.rate,
					T::MinCommissionRate::get(),
					T::MaxCommissionRate::get(),
				)
				.map_err(|e| {
					log::debug!("rejected registration of {caller:?}: {e}");
					Error::<T>::CommissionOutOfBounds
				})?;
			}
			ensure!(!min_self_delegation.is_zero(), Error::<T>::InvalidMinSelfDelegation);

			Self::add_pending(
				&caller,
				PendingValidator { description, consensus_key, commission, min_self_delegation },
			)?;

			Self::deposit_event(Event::<T>::PendingValidatorAdded(caller));

			Ok(())
		}

		#[pallet::call_index(5)]
		pub fn update_staking_params(origin: OriginFor<T>, params: StakingParams) -> DispatchResult {
			Self::ensure_admin(origin)?;

			T::StakeLedger::set_params(params)?;

			Self::deposit_event(Event::<T>::StakingParamsUpdated);

			Ok(())
		}
	}
}
