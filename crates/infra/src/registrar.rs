//! Movement registration pipeline.
//!
//! [`MovementRegistrar`] is the only writer of stock records and alerts. Every
//! call runs this pipeline:
//!
//! ```text
//! MovementRequest
//!   ↓
//! 1. Validate (pure; nothing is read yet)
//!   ↓
//! 2. Resolve the alert threshold from the product catalog
//!   ↓
//! 3. Open a transaction: read origin/destination balances, stage new ones
//!   ↓
//! 4. Evaluate the alert decision for each touched pair and stage it
//!   ↓
//! 5. Commit stock + alerts + journal entry as one batch
//!   ↓ (conflict: back off and restart at 3, same movement id)
//! 6. Publish ledger events (best effort)
//! ```
//!
//! Insufficient stock is decided on the balance read inside the transaction,
//! and the commit re-checks that balance's version. Two racing withdrawals can
//! therefore never both succeed against the same stock.

use std::thread;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use stockledger_core::{DomainError, MovementId};
use stockledger_events::{Event, EventBus, NullEventBus};
use stockledger_inventory::{
    AlertDecision, LedgerEvent, Movement, MovementRequest, Quantity, StockKey, StockRecord,
    evaluate_alert,
};

use crate::config::LedgerConfig;
use crate::retry::RetryPolicy;
use crate::store::{CatalogStore, LedgerStore, LedgerTransaction, StoreError};

#[derive(Debug, Error)]
pub enum MovementError {
    /// The request is malformed (caller bug).
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// Withdrawal larger than the balance at the origin.
    #[error("Insufficient stock. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        key: StockKey,
        available: Quantity,
        requested: Quantity,
    },

    /// Unknown product or location (strict catalog mode only).
    #[error("not found: {0}")]
    NotFound(String),

    /// Contention outlasted the retry policy.
    #[error("transaction failed after {attempts} attempt(s): {reason}")]
    TransactionFailed { attempts: u32, reason: String },

    #[error(transparent)]
    Store(StoreError),
}

impl MovementError {
    /// Whether re-submitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MovementError::TransactionFailed { .. })
    }
}

impl From<DomainError> for MovementError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(what) => MovementError::NotFound(what),
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Conflict(msg) => MovementError::InvalidMovement(msg),
        }
    }
}

impl From<StoreError> for MovementError {
    fn from(value: StoreError) -> Self {
        MovementError::Store(value)
    }
}

/// Outcome of a committed movement.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMovement {
    pub movement: Movement,
    /// Post-commit balances of every touched pair (origin first).
    pub balances: Vec<StockRecord>,
    /// Alert transitions written by the commit. `Noop`s are omitted.
    pub alerts: Vec<AlertDecision>,
    /// Runs needed, 1 when there was no contention.
    pub attempts: u32,
}

impl RegisteredMovement {
    pub fn balance(&self, key: &StockKey) -> Option<Quantity> {
        self.balances
            .iter()
            .find(|r| r.key() == *key)
            .map(|r| r.quantity)
    }
}

#[derive(Debug)]
pub struct MovementRegistrar<S, B = NullEventBus> {
    store: S,
    bus: B,
    policy: RetryPolicy,
    strict_catalog: bool,
}

impl<S> MovementRegistrar<S, NullEventBus> {
    pub fn new(store: S) -> Self {
        Self::with_bus(store, NullEventBus)
    }
}

impl<S, B> MovementRegistrar<S, B> {
    pub fn with_bus(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            policy: RetryPolicy::default(),
            strict_catalog: false,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn strict_catalog(mut self, strict: bool) -> Self {
        self.strict_catalog = strict;
        self
    }

    /// Apply retry and catalog settings from configuration.
    pub fn configured(self, config: &LedgerConfig) -> Self {
        self.with_retry_policy(config.retry.to_policy())
            .strict_catalog(config.strict_catalog)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> MovementRegistrar<S, B>
where
    S: LedgerStore + CatalogStore,
    B: EventBus<LedgerEvent>,
{
    /// Validate and apply one movement atomically.
    ///
    /// On success the stock records, alert documents and journal entry are
    /// all committed; on any error none of them is.
    pub fn register_movement(
        &self,
        request: MovementRequest,
    ) -> Result<RegisteredMovement, MovementError> {
        let span = info_span!(
            "register_movement",
            product_id = %request.product_id,
            movement_type = %request.movement_type(),
        );
        let _guard = span.enter();

        let quantity = request.validate()?;
        let threshold = self.resolve_threshold(&request)?;

        // Fixed across attempts: a caller that timed out can look it up.
        let movement_id = MovementId::new();
        let mut attempt = 1;

        loop {
            match self.attempt(&request, movement_id, quantity, threshold, Utc::now()) {
                Ok(mut registered) => {
                    registered.attempts = attempt;
                    info!(
                        movement_id = %registered.movement.id,
                        quantity = %quantity,
                        attempts = attempt,
                        "movement committed"
                    );
                    self.publish(&registered);
                    return Ok(registered);
                }
                Err(MovementError::Store(e)) if e.is_conflict() => {
                    if !self.policy.should_retry(attempt) {
                        warn!(attempts = attempt, error = %e, "retries exhausted");
                        return Err(MovementError::TransactionFailed {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "commit conflict, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    debug!(error = %e, "movement rejected");
                    return Err(e);
                }
            }
        }
    }

    /// Alert threshold for the request's product. In strict mode this also
    /// checks that the product and every referenced location are active.
    fn resolve_threshold(&self, request: &MovementRequest) -> Result<Quantity, MovementError> {
        let product = self.store.get_product(request.product_id)?;

        if self.strict_catalog {
            let product = product
                .ok_or_else(|| MovementError::NotFound(format!("product {}", request.product_id)))?;
            if !product.is_active {
                return Err(MovementError::InvalidMovement(format!(
                    "product {} is inactive",
                    product.id
                )));
            }
            for location_id in request.kind.locations() {
                let location = self
                    .store
                    .get_location(location_id)?
                    .ok_or_else(|| MovementError::NotFound(format!("location {location_id}")))?;
                if !location.is_active {
                    return Err(MovementError::InvalidMovement(format!(
                        "location {location_id} is inactive"
                    )));
                }
            }
            return Ok(product.threshold());
        }

        match product {
            Some(p) => Ok(p.threshold()),
            None => {
                warn!("product not in catalog, alert threshold defaults to 0");
                Ok(Quantity::ZERO)
            }
        }
    }

    /// One transactional run. Conflicts surface as `MovementError::Store(Conflict)`.
    fn attempt(
        &self,
        request: &MovementRequest,
        movement_id: MovementId,
        quantity: Quantity,
        threshold: Quantity,
        now: DateTime<Utc>,
    ) -> Result<RegisteredMovement, MovementError> {
        let mut tx = LedgerTransaction::begin(&self.store);
        let mut balances = Vec::with_capacity(2);

        if let Some(origin) = request.kind.outgoing_location() {
            let key = StockKey::new(request.product_id, origin);
            let current = tx.stock(&key)?;
            let available = current.as_ref().map_or(Quantity::ZERO, |r| r.quantity);
            let remaining =
                available
                    .checked_sub(quantity)
                    .ok_or(MovementError::InsufficientStock {
                        key,
                        available,
                        requested: quantity,
                    })?;
            let record = current
                .unwrap_or_else(|| StockRecord::empty(key, now))
                .with_quantity(remaining, now);
            tx.stage_stock(record.clone())?;
            balances.push(record);
        }

        if let Some(destination) = request.kind.incoming_location() {
            let key = StockKey::new(request.product_id, destination);
            let current = tx
                .stock(&key)?
                .unwrap_or_else(|| StockRecord::empty(key, now));
            let total = current.quantity.checked_add(quantity).ok_or_else(|| {
                MovementError::InvalidMovement(format!("balance overflow at {key}"))
            })?;
            let record = current.with_quantity(total, now);
            tx.stage_stock(record.clone())?;
            balances.push(record);
        }

        let mut alerts = Vec::new();
        for record in &balances {
            let key = record.key();
            let existing = tx.alert(&key)?;
            let decision = evaluate_alert(key, record.quantity, threshold, existing.as_ref(), now);
            debug!(%key, quantity = %record.quantity, %threshold, ?decision, "alert evaluated");
            if let Some(alert) = decision.alert() {
                tx.stage_alert(alert.clone())?;
                alerts.push(decision);
            }
        }

        let movement = Movement::record(movement_id, request.clone(), quantity, now);
        tx.commit(movement.clone())?;

        Ok(RegisteredMovement {
            movement,
            balances,
            alerts,
            attempts: 1,
        })
    }

    fn publish(&self, registered: &RegisteredMovement) {
        let events = std::iter::once(LedgerEvent::MovementRegistered(registered.movement.clone()))
            .chain(registered.alerts.iter().filter_map(|d| match d {
                AlertDecision::Create(a) => Some(LedgerEvent::AlertRaised(a.clone())),
                AlertDecision::Resolve(a) => Some(LedgerEvent::AlertResolved(a.clone())),
                AlertDecision::Update(_) | AlertDecision::Noop => None,
            }));

        for event in events {
            let (event_type, subject) = (event.event_type(), event.subject());
            if let Err(e) = self.bus.publish(event) {
                warn!(event_type, %subject, error = ?e, "ledger event publish failed; movement stays committed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use stockledger_core::{LocationId, ProductId, UserId, Versioned};
    use stockledger_events::InMemoryEventBus;
    use stockledger_inventory::{
        Alert, AlertStatus, AlertType, Location, LocationType, NewLocation, NewProduct, Product,
    };

    use super::*;
    use crate::store::{CommitBatch, InMemoryLedgerStore, MovementQuery};

    struct Fixture {
        registrar: MovementRegistrar<Arc<InMemoryLedgerStore>>,
        store: Arc<InMemoryLedgerStore>,
        product: ProductId,
        warehouse: LocationId,
        van: LocationId,
        user: UserId,
    }

    fn fixture(min_stock: u32) -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let now = Utc::now();
        let product = NewProduct::new("R410A", "Refrigerante R410A", Quantity::from(min_stock))
            .into_product(ProductId::new(), now)
            .unwrap();
        let warehouse = NewLocation::new("Almacén Principal", LocationType::Almacen)
            .into_location(LocationId::new(), now)
            .unwrap();
        let van = NewLocation::new("Camioneta 1", LocationType::Vehiculo)
            .into_location(LocationId::new(), now)
            .unwrap();

        let (p, w, v) = (product.id, warehouse.id, van.id);
        store.put_product(product).unwrap();
        store.put_location(warehouse).unwrap();
        store.put_location(van).unwrap();

        Fixture {
            registrar: MovementRegistrar::new(store.clone())
                .with_retry_policy(RetryPolicy::fixed(5, Duration::ZERO)),
            store,
            product: p,
            warehouse: w,
            van: v,
            user: UserId::new(),
        }
    }

    impl Fixture {
        fn qty(&self, location: LocationId) -> Option<Quantity> {
            self.store
                .get_stock(&StockKey::new(self.product, location))
                .unwrap()
                .map(|v| v.value.quantity)
        }

        fn alert(&self, location: LocationId) -> Option<Alert> {
            self.store
                .get_alert(&StockKey::new(self.product, location))
                .unwrap()
                .map(Versioned::into_value)
        }

        fn entrada(&self, location: LocationId, qty: rust_decimal::Decimal) -> RegisteredMovement {
            self.registrar
                .register_movement(MovementRequest::entrada(self.product, location, qty, "Compra", self.user))
                .unwrap()
        }
    }

    #[test]
    fn entry_then_exit_updates_balance() {
        let f = fixture(10);
        let registered = f.entrada(f.warehouse, dec!(100));
        assert_eq!(registered.attempts, 1);
        assert_eq!(f.qty(f.warehouse), Some(Quantity::from(100)));

        f.registrar
            .register_movement(
                MovementRequest::salida(f.product, f.warehouse, dec!(30), "Consumo Ticket", f.user)
                    .with_ticket("T-1"),
            )
            .unwrap();

        assert_eq!(f.qty(f.warehouse), Some(Quantity::from(70)));
        assert_eq!(f.store.movements(&MovementQuery::default()).unwrap().len(), 2);
        assert!(f.alert(f.warehouse).is_none());
    }

    #[test]
    fn insufficient_stock_commits_nothing() {
        let f = fixture(10);
        f.entrada(f.warehouse, dec!(30));

        let err = f
            .registrar
            .register_movement(MovementRequest::salida(f.product, f.warehouse, dec!(100), "Consumo", f.user))
            .unwrap_err();

        assert_eq!(err.to_string(), "Insufficient stock. Available: 30, Requested: 100");
        assert!(!err.is_retryable());
        assert_eq!(f.qty(f.warehouse), Some(Quantity::from(30)));
        assert_eq!(f.store.movements(&MovementQuery::default()).unwrap().len(), 1);
    }

    #[test]
    fn exit_from_missing_record_reports_zero_available() {
        let f = fixture(10);
        let err = f
            .registrar
            .register_movement(MovementRequest::salida(f.product, f.van, dec!(1), "Consumo", f.user))
            .unwrap_err();

        match err {
            MovementError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, Quantity::ZERO);
                assert_eq!(requested, Quantity::from(1));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert!(f.qty(f.van).is_none());
    }

    #[test]
    fn dropping_below_threshold_raises_alert() {
        let f = fixture(10);
        f.entrada(f.warehouse, dec!(15));

        let registered = f
            .registrar
            .register_movement(MovementRequest::salida(f.product, f.warehouse, dec!(10), "Consumo", f.user))
            .unwrap();

        assert!(matches!(registered.alerts.as_slice(), [AlertDecision::Create(_)]));
        let alert = f.alert(f.warehouse).unwrap();
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.alert_type, AlertType::LowStock);
        assert_eq!(alert.current_qty, Quantity::from(5));
        assert_eq!(alert.threshold, Quantity::from(10));
    }

    #[test]
    fn restocking_resolves_alert() {
        let f = fixture(10);
        f.entrada(f.warehouse, dec!(5));
        assert!(f.alert(f.warehouse).unwrap().is_active());

        f.entrada(f.warehouse, dec!(20));

        let alert = f.alert(f.warehouse).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.current_qty, Quantity::from(25));
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn transfer_moves_stock_and_alerts_both_ends() {
        let f = fixture(10);
        f.entrada(f.warehouse, dec!(50));

        let registered = f
            .registrar
            .register_movement(MovementRequest::transferencia(
                f.product,
                f.warehouse,
                f.van,
                dec!(20),
                "Reparto",
                f.user,
            ))
            .unwrap();

        assert_eq!(f.qty(f.warehouse), Some(Quantity::from(30)));
        assert_eq!(f.qty(f.van), Some(Quantity::from(20)));
        assert_eq!(
            registered.balance(&StockKey::new(f.product, f.van)),
            Some(Quantity::from(20))
        );
        assert!(f.alert(f.warehouse).is_none());
        assert!(f.alert(f.van).is_none());
    }

    #[test]
    fn adjustment_always_increases() {
        let f = fixture(0);
        f.entrada(f.van, dec!(2));
        f.registrar
            .register_movement(MovementRequest::ajuste(f.product, f.van, dec!(3), "Conteo físico", f.user))
            .unwrap();
        assert_eq!(f.qty(f.van), Some(Quantity::from(5)));
    }

    #[test]
    fn zero_balance_is_out_of_stock_even_with_zero_threshold() {
        let f = fixture(0);
        f.entrada(f.van, dec!(4));
        f.registrar
            .register_movement(MovementRequest::salida(f.product, f.van, dec!(4), "Consumo", f.user))
            .unwrap();

        assert_eq!(f.qty(f.van), Some(Quantity::ZERO));
        assert_eq!(f.alert(f.van).unwrap().alert_type, AlertType::OutOfStock);
    }

    #[test]
    fn invalid_requests_are_rejected_before_reading() {
        let f = fixture(10);
        let err = f
            .registrar
            .register_movement(MovementRequest::entrada(f.product, f.van, dec!(0), "Compra", f.user))
            .unwrap_err();
        assert!(matches!(err, MovementError::InvalidMovement(_)));
        assert!(f.store.movements(&MovementQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn missing_product_uses_zero_threshold_unless_strict() {
        let f = fixture(10);
        let stranger = ProductId::new();

        let lenient = f
            .registrar
            .register_movement(MovementRequest::entrada(stranger, f.van, dec!(1), "Compra", f.user))
            .unwrap();
        assert!(lenient.alerts.is_empty());

        let strict = MovementRegistrar::new(f.store.clone()).strict_catalog(true);
        let err = strict
            .register_movement(MovementRequest::entrada(stranger, f.van, dec!(1), "Compra", f.user))
            .unwrap_err();
        assert!(matches!(err, MovementError::NotFound(_)));
    }

    #[test]
    fn strict_mode_rejects_inactive_locations() {
        let f = fixture(10);
        let mut van: Location = f.store.get_location(f.van).unwrap().unwrap();
        van.deactivate(Utc::now());
        f.store.put_location(van).unwrap();

        let strict = MovementRegistrar::new(f.store.clone()).strict_catalog(true);
        let err = strict
            .register_movement(MovementRequest::entrada(f.product, f.van, dec!(1), "Compra", f.user))
            .unwrap_err();
        assert!(matches!(err, MovementError::InvalidMovement(_)));
        assert!(f.qty(f.van).is_none());
    }

    #[test]
    fn committed_movements_are_published() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let bus = Arc::new(InMemoryEventBus::<LedgerEvent>::new());
        let subscription = bus.subscribe();
        let registrar = MovementRegistrar::with_bus(store, bus);

        let product = ProductId::new();
        let location = LocationId::new();
        registrar
            .register_movement(MovementRequest::entrada(product, location, dec!(0.5), "Compra", UserId::new()))
            .unwrap();
        registrar
            .register_movement(MovementRequest::salida(product, location, dec!(0.5), "Consumo", UserId::new()))
            .unwrap();

        let events = subscription.drain();
        let types: Vec<_> = events.iter().map(stockledger_events::Event::event_type).collect();
        assert_eq!(
            types,
            vec![
                "inventory.movement.registered",
                "inventory.movement.registered",
                "inventory.alert.raised",
            ]
        );
    }

    /// Store whose commits always lose the race.
    struct AlwaysConflicting {
        inner: InMemoryLedgerStore,
        commits: AtomicU32,
    }

    impl LedgerStore for AlwaysConflicting {
        fn get_stock(&self, key: &StockKey) -> Result<Option<Versioned<StockRecord>>, StoreError> {
            self.inner.get_stock(key)
        }
        fn get_alert(&self, key: &StockKey) -> Result<Option<Versioned<Alert>>, StoreError> {
            self.inner.get_alert(key)
        }
        fn commit(&self, _batch: CommitBatch) -> Result<(), StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict("stock changed".to_string()))
        }
        fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, StoreError> {
            self.inner.stock_by_product(product_id)
        }
        fn stock_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, StoreError> {
            self.inner.stock_by_location(location_id)
        }
        fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
            self.inner.all_stock()
        }
        fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
            self.inner.get_movement(id)
        }
        fn movements(&self, query: &MovementQuery) -> Result<Vec<Movement>, StoreError> {
            self.inner.movements(query)
        }
        fn alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>, StoreError> {
            self.inner.alerts(status)
        }
    }

    impl CatalogStore for AlwaysConflicting {
        fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.get_product(id)
        }
        fn put_product(&self, product: Product) -> Result<(), StoreError> {
            self.inner.put_product(product)
        }
        fn list_products(&self) -> Result<Vec<Product>, StoreError> {
            self.inner.list_products()
        }
        fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
            self.inner.get_location(id)
        }
        fn put_location(&self, location: Location) -> Result<(), StoreError> {
            self.inner.put_location(location)
        }
        fn list_locations(&self) -> Result<Vec<Location>, StoreError> {
            self.inner.list_locations()
        }
    }

    #[test]
    fn persistent_contention_exhausts_the_retry_policy() {
        let store = AlwaysConflicting {
            inner: InMemoryLedgerStore::new(),
            commits: AtomicU32::new(0),
        };
        let registrar =
            MovementRegistrar::new(store).with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));

        let err = registrar
            .register_movement(MovementRequest::entrada(
                ProductId::new(),
                LocationId::new(),
                dec!(1),
                "Compra",
                UserId::new(),
            ))
            .unwrap_err();

        match &err {
            MovementError::TransactionFailed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected TransactionFailed, got {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(registrar.store().commits.load(Ordering::SeqCst), 3);
        assert!(registrar.store().inner.all_stock().unwrap().is_empty());
    }
}
