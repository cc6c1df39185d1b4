use frame_support::{
	pallet_prelude::ValueQuery,
	parameter_types,
	traits::{ConstU16, ConstU64},
	PalletId, Twox64Concat,
};
use sp_core::{ConstU32, H256};
use sp_runtime::{
	traits::{BlakeTwo256, IdentifyAccount, IdentityLookup, Verify},
	BuildStorage, DispatchResult, MultiSignature, Perbill,
};

use crate::{
	self as poa, CommissionLimiter, GenesisValidator, InspectCall, PoaParams, StakingActionFilter,
	StakingMessage, WithdrawRewardsFilter,
};
use utils::{
	traits::{LifecycleEvent, SigningInfo, StakeLedger, ValidatorLifecycle},
	CommissionRates, Delegation, Description, StakingParams, ValidatorRecord,
};

type UncheckedExtrinsic = frame_system::mocking::MockUncheckedExtrinsic<Test>;
type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
	pub enum Test
	{
		System: frame_system,
		Balances: pallet_balances,
		Poa: poa,
	}
);

pub type Signature = MultiSignature;
pub type AccountPublic = <Signature as Verify>::Signer;
pub type AccountId = <AccountPublic as IdentifyAccount>::AccountId;
pub type Balance = u64;

/// One token in the smallest unit, also the power reduction of the mock ledger.
pub const ONE: Balance = 1_000_000;

impl frame_system::Config for Test {
	type BaseCallFilter = frame_support::traits::Everything;
	type BlockWeights = ();
	type BlockLength = ();
	type DbWeight = ();
	type RuntimeOrigin = RuntimeOrigin;
	type RuntimeCall = RuntimeCall;
	type Nonce = u64;
	type Hash = H256;
	type Hashing = BlakeTwo256;
	type AccountId = AccountId;
	type Lookup = IdentityLookup<AccountId>;
	type Block = Block;
	type RuntimeEvent = RuntimeEvent;
	type BlockHashCount = ConstU64<250>;
	type Version = ();
	type PalletInfo = PalletInfo;
	type AccountData = pallet_balances::AccountData<Balance>;
	type OnNewAccount = ();
	type OnKilledAccount = ();
	type SystemWeightInfo = ();
	type SS58Prefix = ConstU16<42>;
	type OnSetCode = ();
	type MaxConsumers = frame_support::traits::ConstU32<16>;
	type RuntimeTask = ();
	type SingleBlockMigrations = ();
	type MultiBlockMigrator = ();
	type PreInherents = ();
	type PostInherents = ();
	type PostTransactions = ();
}

impl pallet_balances::Config for Test {
	type MaxLocks = ConstU32<50>;
	type MaxReserves = ();
	type ReserveIdentifier = [u8; 8];
	type Balance = Balance;
	type RuntimeEvent = RuntimeEvent;
	type DustRemoval = ();
	type ExistentialDeposit = ConstU64<1>;
	type AccountStore = System;
	type WeightInfo = ();
	type FreezeIdentifier = ();
	type MaxFreezes = ();
	type RuntimeHoldReason = ();
	type RuntimeFreezeReason = ();
}

// The stake ledger lives in plain storage so that it is rolled back with the
// transaction like the real one.
#[frame_support::storage_alias]
pub type LedgerValidators =
	StorageMap<MockStaking, Twox64Concat, AccountId, ValidatorRecord<AccountId, Balance>>;

#[frame_support::storage_alias]
pub type ConsensusIndex = StorageMap<MockStaking, Twox64Concat, Vec<u8>, AccountId>;

#[frame_support::storage_alias]
pub type PowerIndex = StorageMap<MockStaking, Twox64Concat, AccountId, Balance>;

#[frame_support::storage_alias]
pub type Delegations =
	StorageMap<MockStaking, Twox64Concat, AccountId, Delegation<AccountId, Balance>>;

#[frame_support::storage_alias]
pub type LastPowers = StorageMap<MockStaking, Twox64Concat, AccountId, u64>;

#[frame_support::storage_alias]
pub type TotalPower = StorageValue<MockStaking, u64, ValueQuery>;

#[frame_support::storage_alias]
pub type StakingParamsStore = StorageValue<MockStaking, StakingParams, ValueQuery>;

#[frame_support::storage_alias]
pub type SigningInfos = StorageMap<MockStaking, Twox64Concat, AccountId, u32>;

parameter_types! {
	pub const PoaPalletId: PalletId = PalletId(*b"mos/poa_");
	pub static MinCommission: Perbill = Perbill::from_percent(10);
	pub static MaxCommission: Perbill = Perbill::from_percent(50);
	pub static EnforceAtGenesis: bool = false;
	pub static MaxPowerChange: Perbill = Perbill::from_percent(30);
	pub static OneToken: Balance = ONE;
	pub static LifecycleLog: Vec<LifecycleEvent<AccountId>> = Vec::new();
}

/// Keeps every lifecycle signal the ledger fires.
pub struct LifecycleRecorder;

impl ValidatorLifecycle<AccountId> for LifecycleRecorder {
	fn on_lifecycle_event(event: &LifecycleEvent<AccountId>) -> DispatchResult {
		LifecycleLog::mutate(|log| log.push(event.clone()));
		Ok(())
	}
}

type LifecycleHooks = (Poa, LifecycleRecorder);

pub struct MockLedger;

impl StakeLedger<AccountId, Balance> for MockLedger {
	fn validator(operator: &AccountId) -> Option<ValidatorRecord<AccountId, Balance>> {
		LedgerValidators::get(operator)
	}

	fn set_validator(validator: &ValidatorRecord<AccountId, Balance>) -> DispatchResult {
		if LedgerValidators::contains_key(&validator.operator) {
			Self::notify(&LifecycleEvent::BeforeValidatorModified(validator.operator.clone()))?;
		}

		LedgerValidators::insert(&validator.operator, validator);
		Ok(())
	}

	fn validator_by_consensus_key(key: &[u8]) -> Option<AccountId> {
		ConsensusIndex::get(key.to_vec())
	}

	fn set_validator_by_consensus_key(
		validator: &ValidatorRecord<AccountId, Balance>,
	) -> DispatchResult {
		ConsensusIndex::insert(validator.consensus_key.clone(), &validator.operator);
		Ok(())
	}

	fn set_validator_by_power_index(
		validator: &ValidatorRecord<AccountId, Balance>,
	) -> DispatchResult {
		PowerIndex::insert(&validator.operator, validator.tokens);
		Ok(())
	}

	fn validators() -> Vec<ValidatorRecord<AccountId, Balance>> {
		LedgerValidators::iter_values().collect()
	}

	fn set_delegation(delegation: &Delegation<AccountId, Balance>) -> DispatchResult {
		Delegations::insert(&delegation.validator, delegation);
		Ok(())
	}

	fn last_validator_power(operator: &AccountId) -> Option<u64> {
		LastPowers::get(operator)
	}

	fn set_last_validator_power(operator: &AccountId, power: u64) -> DispatchResult {
		LastPowers::insert(operator, power);
		Ok(())
	}

	fn remove_last_validator_power(operator: &AccountId) -> DispatchResult {
		LastPowers::remove(operator);
		Ok(())
	}

	fn total_power() -> u64 {
		TotalPower::get()
	}

	fn set_total_power(power: u64) -> DispatchResult {
		TotalPower::put(power);
		Ok(())
	}

	fn power_reduction() -> Balance {
		ONE
	}

	fn params() -> StakingParams {
		StakingParamsStore::get()
	}

	fn set_params(params: StakingParams) -> DispatchResult {
		StakingParamsStore::put(params);
		Ok(())
	}

	fn notify(event: &LifecycleEvent<AccountId>) -> DispatchResult {
		<LifecycleHooks as ValidatorLifecycle<AccountId>>::on_lifecycle_event(event)
	}
}

pub struct MockSigningInfo;

impl SigningInfo<AccountId> for MockSigningInfo {
	fn initialize(
		operator: &AccountId,
		_consensus_key: &[u8],
		start_height: u32,
	) -> DispatchResult {
		SigningInfos::insert(operator, start_height);
		Ok(())
	}

	fn clear(operator: &AccountId) -> DispatchResult {
		SigningInfos::remove(operator);
		Ok(())
	}
}

/// Remarks stand in for the staking messages of the ledger.
pub struct RemarkInspector;

impl InspectCall<RuntimeCall, AccountId, Balance> for RemarkInspector {
	fn inspect(call: &RuntimeCall) -> crate::CallKind<'_, RuntimeCall, AccountId, Balance> {
		let msg = match call {
			RuntimeCall::System(frame_system::Call::remark { remark }) => match &remark[..] {
				b"delegate" => StakingMessage::Delegate,
				b"withdraw-rewards" => StakingMessage::WithdrawRewards,
				b"edit-validator" => StakingMessage::EditValidator {
					commission_rate: Some(Perbill::from_percent(60)),
				},
				_ => StakingMessage::Other,
			},
			_ => StakingMessage::Other,
		};

		crate::CallKind::Message(msg)
	}
}

impl poa::Config for Test {
	type RuntimeEvent = RuntimeEvent;
	type Balance = Balance;
	type Currency = Balances;
	type StakeLedger = MockLedger;
	type SigningInfo = MockSigningInfo;
	type CallInspector = RemarkInspector;
	type AdmissionFilters =
		(StakingActionFilter<Test>, CommissionLimiter<Test>, WithdrawRewardsFilter<Test>);
	type MaxPowerChange = MaxPowerChange;
	type MinCommissionRate = MinCommission;
	type MaxCommissionRate = MaxCommission;
	type EnforceCommissionAtGenesis = EnforceAtGenesis;
	type OneToken = OneToken;
	type PalletId = PoaPalletId;
}

pub fn account(id: u8) -> AccountId {
	[id; 32].into()
}

pub fn admin() -> AccountId {
	account(100)
}

pub fn commission(rate: u32) -> CommissionRates {
	CommissionRates::new(
		Perbill::from_percent(rate),
		Perbill::from_percent(50),
		Perbill::from_percent(1),
	)
}

pub fn genesis_validator(id: u8, power: Balance) -> GenesisValidator<AccountId, Balance> {
	GenesisValidator {
		operator: account(id),
		consensus_key: vec![id; 32],
		power,
		commission: commission(10),
		description: Description { moniker: vec![b'v', id], ..Default::default() },
	}
}

pub struct ExtBuilder {
	params: PoaParams<AccountId>,
	validators: Vec<GenesisValidator<AccountId, Balance>>,
}

impl Default for ExtBuilder {
	fn default() -> Self {
		Self {
			params: PoaParams {
				admins: vec![admin()],
				whitelist: vec![],
				allow_validator_self_exit: false,
			},
			// 10 power each, 40 in total.
			validators: (1..=4).map(|id| genesis_validator(id, 10 * ONE)).collect(),
		}
	}
}

impl ExtBuilder {
	pub fn whitelist(mut self, whitelist: Vec<AccountId>) -> Self {
		self.params.whitelist = whitelist;
		self
	}

	pub fn self_exit(mut self, allowed: bool) -> Self {
		self.params.allow_validator_self_exit = allowed;
		self
	}

	pub fn validators(mut self, validators: Vec<GenesisValidator<AccountId, Balance>>) -> Self {
		self.validators = validators;
		self
	}

	// Build genesis storage according to the mock runtime.
	pub fn build(self) -> sp_io::TestExternalities {
		let mut t = frame_system::GenesisConfig::<Test>::default().build_storage().unwrap();

		poa::GenesisConfig::<Test> { params: self.params, validators: self.validators }
			.assimilate_storage(&mut t)
			.unwrap();

		let mut ext = sp_io::TestExternalities::new(t);

		ext.execute_with(|| {
			LifecycleLog::take();
			System::set_block_number(1);
		});

		ext
	}
}

pub fn new_test_ext() -> sp_io::TestExternalities {
	ExtBuilder::default().build()
}
