use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, span, warn, Level};

use crate::{
    ledger::Ledger,
    reminder::ReminderLock,
    store::{Store, StoreError, CARDS_KEY, LOCK_KEY, PAYMENTS_KEY},
};

/// One user's working copy: the ledger read from the store, written back whole.
pub struct Session<S: Store> {
    store: S,
    pub ledger: Ledger,
}

/// Missing or unparsable documents load as empty. Within a readable array,
/// records that do not deserialize are dropped one by one.
fn load_document<S: Store, T: DeserializeOwned>(store: &S, key: &str) -> Result<Vec<T>, StoreError> {
    let Some(text) = store.get(key)? else {
        return Ok(Vec::new());
    };

    let records = match serde_json::from_str::<Vec<Value>>(&text) {
        Ok(records) => records,
        Err(e) => {
            warn!("'{}' is corrupt, treating as empty: {}", key, e);
            return Ok(Vec::new());
        }
    };

    let total = records.len();
    let loaded: Vec<T> = records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("'{}' record dropped: {}", key, e);
                None
            }
        })
        .collect_vec();

    if loaded.len() < total {
        warn!(
            key,
            skipped = total - loaded.len(),
            "unreadable records dropped"
        );
    }

    Ok(loaded)
}

impl<S: Store> Session<S> {
    pub fn open(store: S) -> anyhow::Result<Self> {
        let _span = span!(Level::INFO, "loading").entered();

        let cards = load_document(&store, CARDS_KEY)?;
        let payments = load_document(&store, PAYMENTS_KEY)?;
        let persisted = store
            .get(LOCK_KEY)?
            .map(|flag| ReminderLock::from_flag(&flag))
            .unwrap_or_default();

        let ledger = Ledger::restore(cards, payments, persisted);
        if ledger.lock() != persisted {
            info!("ledger is empty, reminder lock released");
        }
        info!(
            cards = ledger.cards().len(),
            payments = ledger.payments().len(),
            locked = ledger.lock().is_locked(),
            "loaded"
        );

        Ok(Self { store, ledger })
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.store
            .set(CARDS_KEY, &serde_json::to_string(self.ledger.cards())?)?;
        self.store
            .set(PAYMENTS_KEY, &serde_json::to_string(self.ledger.payments())?)?;
        self.store.set(LOCK_KEY, self.ledger.lock().as_flag())?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }
}
