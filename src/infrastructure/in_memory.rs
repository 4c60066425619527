//! In-memory collaborator implementations used by tests and the CLI.

use crate::domain::notification::NotificationRecord;
use crate::domain::ports::{Authorizer, AuditSink, Capability, Clock, TokenError, TokenLedger};
use crate::domain::{AccountId, TokenAmount};
use crate::error::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Mutex, RwLock};

/// A balance/allowance token ledger held in keyed maps.
///
/// Uses `RwLock<HashMap>` for shared access from the engines. An allowance
/// of `TokenAmount::MAX` is treated as unlimited and never decremented.
#[derive(Default)]
pub struct InMemoryTokenLedger {
    balances: RwLock<HashMap<AccountId, TokenAmount>>,
    allowances: RwLock<HashMap<AccountId, TokenAmount>>,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits fresh tokens to an account. Fixture setup only.
    pub fn mint(&self, account: AccountId, amount: TokenAmount) {
        let mut balances = self.balances.write().expect("token lock poisoned");
        *balances.entry(account).or_default() += amount;
    }

    /// Removes tokens from an account, saturating at zero. Fixture setup only.
    pub fn burn(&self, account: AccountId, amount: TokenAmount) {
        let mut balances = self.balances.write().expect("token lock poisoned");
        let balance = balances.entry(account).or_default();
        *balance = balance.saturating_sub(amount);
    }

    /// Sets the allowance the account grants to the core.
    pub fn approve(&self, owner: AccountId, amount: TokenAmount) {
        let mut allowances = self.allowances.write().expect("token lock poisoned");
        allowances.insert(owner, amount);
    }

    fn move_tokens(
        &self,
        from: AccountId,
        to: AccountId,
        amount: TokenAmount,
    ) -> std::result::Result<(), TokenError> {
        let mut balances = self.balances.write().expect("token lock poisoned");
        let balance = balances.get(&from).copied().unwrap_or(0);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                balance,
                needed: amount,
            });
        }
        *balances.entry(from).or_default() -= amount;
        *balances.entry(to).or_default() += amount;
        Ok(())
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: TokenAmount,
    ) -> std::result::Result<(), TokenError> {
        self.move_tokens(from, to, amount)
    }

    fn transfer_from(
        &self,
        owner: AccountId,
        to: AccountId,
        amount: TokenAmount,
    ) -> std::result::Result<(), TokenError> {
        let allowance = self.allowance_of(owner);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner,
                allowance,
                needed: amount,
            });
        }
        self.move_tokens(owner, to, amount)?;
        if allowance != TokenAmount::MAX {
            let mut allowances = self.allowances.write().expect("token lock poisoned");
            allowances.insert(owner, allowance - amount);
        }
        Ok(())
    }

    fn balance_of(&self, account: AccountId) -> TokenAmount {
        self.balances
            .read()
            .expect("token lock poisoned")
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    fn allowance_of(&self, owner: AccountId) -> TokenAmount {
        self.allowances
            .read()
            .expect("token lock poisoned")
            .get(&owner)
            .copied()
            .unwrap_or(0)
    }
}

/// Role-map authorizer: an account holds a capability only when granted.
#[derive(Default)]
pub struct RoleAuthorizer {
    grants: RwLock<HashMap<Capability, HashSet<AccountId>>>,
}

impl RoleAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, account: AccountId, capability: Capability) {
        let mut grants = self.grants.write().expect("role lock poisoned");
        grants.entry(capability).or_default().insert(account);
    }

    pub fn revoke(&self, account: AccountId, capability: Capability) {
        let mut grants = self.grants.write().expect("role lock poisoned");
        if let Some(holders) = grants.get_mut(&capability) {
            holders.remove(&account);
        }
    }
}

impl Authorizer for RoleAuthorizer {
    fn authorize(&self, caller: AccountId, capability: Capability) -> bool {
        self.grants
            .read()
            .expect("role lock poisoned")
            .get(&capability)
            .is_some_and(|holders| holders.contains(&caller))
    }
}

/// Authorizes every caller for everything. Test fixtures only.
pub struct OpenAuthorizer;

impl Authorizer for OpenAuthorizer {
    fn authorize(&self, _caller: AccountId, _capability: Capability) -> bool {
        true
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock tests move by hand.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: RwLock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}

/// Collects audit records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<NotificationRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.read().expect("audit lock poisoned").clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &NotificationRecord) -> Result<()> {
        self.records
            .write()
            .expect("audit lock poisoned")
            .push(record.clone());
        Ok(())
    }
}

/// Appends each audit record as one JSON line.
pub struct JsonLinesAuditSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesAuditSink<std::fs::File> {
    pub fn create(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            writer: Mutex::new(file),
        })
    }
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn record(&self, record: &NotificationRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().expect("audit lock poisoned");
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
