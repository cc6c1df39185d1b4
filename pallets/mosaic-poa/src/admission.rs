//! Transaction admission control.
//!
//! Runtime calls are mapped onto [`StakingMessage`]s by the runtime's [`InspectCall`] and every
//! message, including those nested in batch or dispatch-as envelopes, is run through the
//! configured [`AdmissionFilter`] chain before the transaction enters the pool or a block.

use codec::{Decode, Encode};
use frame_support::traits::Get;
use frame_system::pallet_prelude::BlockNumberFor;
use scale_info::TypeInfo;
use sp_runtime::{
	traits::{DispatchInfoOf, One, SaturatedConversion, SignedExtension},
	transaction_validity::{
		InvalidTransaction, TransactionValidity, TransactionValidityError, ValidTransaction,
	},
	PerThing, Perbill, RuntimeDebug,
};
use sp_std::{fmt, marker::PhantomData, vec::Vec as SpVec};

use super::{Config, Pallet, Params, PoaParams};

/// Envelopes nested deeper than this are rejected without being inspected.
pub const MAX_NESTED_CALLS: u32 = 6;

/// The staking actions the admission filters distinguish.
#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub enum StakingMessage<AccountId, Balance> {
	Delegate,
	Redelegate,
	Undelegate,
	CancelUnbondingDelegation,
	CreateValidator {
		operator: AccountId,
		commission_rate: Perbill,
		min_self_delegation: Balance,
		value: Balance,
	},
	/// `None` when only the description changes.
	EditValidator {
		commission_rate: Option<Perbill>,
	},
	UpdateStakingParams,
	WithdrawRewards,
	Other,
}

pub enum CallKind<'a, Call, AccountId, Balance> {
	Message(StakingMessage<AccountId, Balance>),
	/// A container executing the inner calls, e.g. a batch or a dispatch-as envelope.
	Batch(&'a [Call]),
	/// A container whose contents could not be recognized.
	Malformed,
}

pub trait InspectCall<Call, AccountId, Balance> {
	fn inspect(call: &Call) -> CallKind<'_, Call, AccountId, Balance>;
}

impl<Call, AccountId, Balance> InspectCall<Call, AccountId, Balance> for () {
	fn inspect(_call: &Call) -> CallKind<'_, Call, AccountId, Balance> {
		CallKind::Message(StakingMessage::Other)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub enum AdmissionError {
	NotAuthorized,
	CommissionOutOfRange { rate: Perbill, floor: Perbill, ceiling: Perbill },
	CommissionNotEqual { rate: Perbill, required: Perbill },
	/// Empty or unrecognized envelope.
	InvalidRequest,
	NestingTooDeep,
	InvalidMinSelfDelegation { min_self_delegation: u128 },
	InvalidSelfBond { value: u128, required: u128 },
	NotPending,
	MintFailed,
	/// One transaction may create a given validator only once.
	DuplicateCreateValidator,
}

impl AdmissionError {
	/// Code reported in `InvalidTransaction::Custom`.
	pub fn code(&self) -> u8 {
		match self {
			Self::NotAuthorized => 1,
			Self::CommissionOutOfRange { .. } => 2,
			Self::CommissionNotEqual { .. } => 3,
			Self::InvalidRequest => 4,
			Self::NestingTooDeep => 5,
			Self::InvalidMinSelfDelegation { .. } => 6,
			Self::InvalidSelfBond { .. } => 7,
			Self::NotPending => 8,
			Self::MintFailed => 9,
			Self::DuplicateCreateValidator => 10,
		}
	}
}

/// Renders a rate with 18 decimals.
struct Dec(Perbill);

impl fmt::Display for Dec {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let parts = self.0.deconstruct();
		write!(f, "{}.{:09}000000000", parts / 1_000_000_000, parts % 1_000_000_000)
	}
}

impl fmt::Display for AdmissionError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NotAuthorized => write!(f, "unauthorized message type"),
			Self::CommissionOutOfRange { rate, floor, ceiling } => {
				write!(f, "rate {} is not between {} and {}", Dec(*rate), Dec(*floor), Dec(*ceiling))
			},
			Self::CommissionNotEqual { rate, required } => {
				write!(f, "rate {} is not equal to {}", Dec(*rate), Dec(*required))
			},
			Self::InvalidRequest => write!(f, "invalid request: empty or unrecognized envelope"),
			Self::NestingTooDeep => {
				write!(f, "envelopes nested deeper than {MAX_NESTED_CALLS} levels")
			},
			Self::InvalidMinSelfDelegation { min_self_delegation } => {
				write!(f, "min self delegation must be 1, got {min_self_delegation}")
			},
			Self::InvalidSelfBond { value, required } => {
				write!(f, "self bond must be exactly {required}, got {value}")
			},
			Self::NotPending => write!(f, "validator is not in the pending set"),
			Self::MintFailed => write!(f, "failed to mint the self bond"),
			Self::DuplicateCreateValidator => {
				write!(f, "validator is created more than once in the transaction")
			},
		}
	}
}

impl From<AdmissionError> for TransactionValidityError {
	fn from(err: AdmissionError) -> Self {
		InvalidTransaction::Custom(err.code()).into()
	}
}

/// State the filters see, loaded once per transaction.
pub struct AdmissionContext<T: Config> {
	pub height: BlockNumberFor<T>,
	pub params: PoaParams<T::AccountId>,
}

impl<T: Config> AdmissionContext<T> {
	pub fn load() -> Self {
		Self { height: frame_system::Pallet::<T>::block_number(), params: Params::<T>::get() }
	}

	/// Transactions of the first block bootstrap the validator set and are exempt.
	pub fn is_genesis(&self) -> bool {
		self.height <= One::one()
	}
}

pub trait AdmissionFilter<T: Config> {
	/// Must not write to storage.
	fn check(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError>;

	/// Called for every message once the whole transaction has been admitted.
	fn on_admitted(
		_msg: &StakingMessage<T::AccountId, T::Balance>,
		_ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		Ok(())
	}
}

#[impl_trait_for_tuples::impl_for_tuples(8)]
impl<T: Config> AdmissionFilter<T> for Tuple {
	fn check(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		for_tuples!( #( Tuple::check(msg, ctx)?; )* );
		Ok(())
	}

	fn on_admitted(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		for_tuples!( #( Tuple::on_admitted(msg, ctx)?; )* );
		Ok(())
	}
}

/// Disables self-service staking once the chain is running. Validators are created
/// only from the pending set with exactly one token of self bond, which is minted here.
pub struct StakingActionFilter<T>(PhantomData<T>);

impl<T: Config> AdmissionFilter<T> for StakingActionFilter<T> {
	fn check(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		if ctx.is_genesis() {
			return Ok(());
		}

		match msg {
			StakingMessage::Delegate |
			StakingMessage::Redelegate |
			StakingMessage::Undelegate |
			StakingMessage::CancelUnbondingDelegation |
			StakingMessage::UpdateStakingParams => Err(AdmissionError::NotAuthorized),
			StakingMessage::CreateValidator { operator, min_self_delegation, value, .. } => {
				if !min_self_delegation.is_one() {
					return Err(AdmissionError::InvalidMinSelfDelegation {
						min_self_delegation: (*min_self_delegation).saturated_into(),
					});
				}

				let required = T::OneToken::get();
				if *value != required {
					return Err(AdmissionError::InvalidSelfBond {
						value: (*value).saturated_into(),
						required: required.saturated_into(),
					});
				}

				if !ctx.params.may_register(operator) {
					return Err(AdmissionError::NotAuthorized);
				}

				if !Pallet::<T>::is_pending(operator) {
					return Err(AdmissionError::NotPending);
				}

				Ok(())
			},
			_ => Ok(()),
		}
	}

	fn on_admitted(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		match msg {
			StakingMessage::CreateValidator { operator, .. } if !ctx.is_genesis() => {
				Pallet::<T>::mint_self_bond(operator).map_err(|e| {
					log::error!("failed to mint self bond of {operator:?}: {e:?}");
					AdmissionError::MintFailed
				})
			},
			_ => Ok(()),
		}
	}
}

/// Keeps commission rates of created and edited validators within the configured band.
pub struct CommissionLimiter<T>(PhantomData<T>);

impl<T: Config> AdmissionFilter<T> for CommissionLimiter<T> {
	fn check(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		if ctx.is_genesis() && !T::EnforceCommissionAtGenesis::get() {
			return Ok(());
		}

		let rate = match msg {
			StakingMessage::CreateValidator { commission_rate, .. } => *commission_rate,
			StakingMessage::EditValidator { commission_rate: Some(rate) } => *rate,
			_ => return Ok(()),
		};

		ensure_commission_in_band(rate, T::MinCommissionRate::get(), T::MaxCommissionRate::get())
	}
}

/// A band collapsed to a single value only admits that value.
pub fn ensure_commission_in_band(
	rate: Perbill,
	floor: Perbill,
	ceiling: Perbill,
) -> Result<(), AdmissionError> {
	if floor == ceiling {
		if rate != floor {
			return Err(AdmissionError::CommissionNotEqual { rate, required: floor });
		}
	} else if rate < floor || rate > ceiling {
		return Err(AdmissionError::CommissionOutOfRange { rate, floor, ceiling });
	}

	Ok(())
}

pub struct WithdrawRewardsFilter<T>(PhantomData<T>);

impl<T: Config> AdmissionFilter<T> for WithdrawRewardsFilter<T> {
	fn check(
		msg: &StakingMessage<T::AccountId, T::Balance>,
		ctx: &AdmissionContext<T>,
	) -> Result<(), AdmissionError> {
		match msg {
			StakingMessage::WithdrawRewards if !ctx.is_genesis() => {
				Err(AdmissionError::NotAuthorized)
			},
			_ => Ok(()),
		}
	}
}

/// Applies `f` to every message in `call`, unwrapping envelopes. Stops at the first error.
pub fn visit_messages<Call, I, AccountId, Balance, F>(
	call: &Call,
	depth: u32,
	f: &mut F,
) -> Result<(), AdmissionError>
where
	I: InspectCall<Call, AccountId, Balance>,
	F: FnMut(&StakingMessage<AccountId, Balance>) -> Result<(), AdmissionError>,
{
	match I::inspect(call) {
		CallKind::Message(msg) => f(&msg),
		CallKind::Batch(calls) => {
			if depth >= MAX_NESTED_CALLS {
				return Err(AdmissionError::NestingTooDeep);
			}

			if calls.is_empty() {
				return Err(AdmissionError::InvalidRequest);
			}

			for inner in calls {
				visit_messages::<Call, I, AccountId, Balance, F>(inner, depth + 1, f)?;
			}

			Ok(())
		},
		CallKind::Malformed => Err(AdmissionError::InvalidRequest),
	}
}

/// Runs the checks of the filter chain over every message of `call`.
/// A validator may be created at most once per call.
pub fn admit<T, Call, I>(call: &Call, ctx: &AdmissionContext<T>) -> Result<(), AdmissionError>
where
	T: Config,
	I: InspectCall<Call, T::AccountId, T::Balance>,
{
	let mut created = SpVec::new();

	visit_messages::<Call, I, T::AccountId, T::Balance, _>(call, 0, &mut |msg| {
		if let StakingMessage::CreateValidator { operator, .. } = msg {
			if created.contains(operator) {
				return Err(AdmissionError::DuplicateCreateValidator);
			}
			created.push(operator.clone());
		}

		T::AdmissionFilters::check(msg, ctx)
	})
}

/// Like [`admit`], then applies the effects of the filter chain.
pub fn admit_and_apply<T, Call, I>(
	call: &Call,
	ctx: &AdmissionContext<T>,
) -> Result<(), AdmissionError>
where
	T: Config,
	I: InspectCall<Call, T::AccountId, T::Balance>,
{
	admit::<T, Call, I>(call, ctx)?;

	visit_messages::<Call, I, T::AccountId, T::Balance, _>(call, 0, &mut |msg| {
		T::AdmissionFilters::on_admitted(msg, ctx)
	})
}

/// Signed extension running the runtime's admission filters.
#[derive(Encode, Decode, Clone, Eq, PartialEq, TypeInfo)]
#[scale_info(skip_type_params(T))]
pub struct CheckPoaAdmission<T: Config + Send + Sync>(PhantomData<T>);

impl<T: Config + Send + Sync> CheckPoaAdmission<T> {
	pub fn new() -> Self {
		Self(PhantomData)
	}
}

impl<T: Config + Send + Sync> Default for CheckPoaAdmission<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Config + Send + Sync> fmt::Debug for CheckPoaAdmission<T> {
	#[cfg(feature = "std")]
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "CheckPoaAdmission")
	}

	#[cfg(not(feature = "std"))]
	fn fmt(&self, _: &mut fmt::Formatter) -> fmt::Result {
		Ok(())
	}
}

impl<T: Config + Send + Sync> SignedExtension for CheckPoaAdmission<T> {
	const IDENTIFIER: &'static str = "CheckPoaAdmission";
	type AccountId = T::AccountId;
	type Call = <T as frame_system::Config>::RuntimeCall;
	type AdditionalSigned = ();
	type Pre = ();

	fn additional_signed(&self) -> Result<(), TransactionValidityError> {
		Ok(())
	}

	fn validate(
		&self,
		who: &Self::AccountId,
		call: &Self::Call,
		_info: &DispatchInfoOf<Self::Call>,
		_len: usize,
	) -> TransactionValidity {
		let ctx = AdmissionContext::<T>::load();

		admit::<T, Self::Call, T::CallInspector>(call, &ctx).map_err(|e| {
			log::debug!("rejected transaction of {who:?}: {e}");
			e
		})?;

		Ok(ValidTransaction::default())
	}

	fn pre_dispatch(
		self,
		who: &Self::AccountId,
		call: &Self::Call,
		_info: &DispatchInfoOf<Self::Call>,
		_len: usize,
	) -> Result<Self::Pre, TransactionValidityError> {
		let ctx = AdmissionContext::<T>::load();

		admit_and_apply::<T, Self::Call, T::CallInspector>(call, &ctx).map_err(|e| {
			log::debug!("rejected transaction of {who:?}: {e}");
			e
		})?;

		Ok(())
	}
}
