//! End-to-end tests across the full in-memory stack: services, event store,
//! bus and read models wired together the way a deployment would.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use dealerdesk_core::{AggregateId, DomainError, LocationId, Money, ProductId, Rate};
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope, InMemoryEventBus, NullAuditSink};
use dealerdesk_fulfillment::{PackingPhase, PackingSlipId};
use dealerdesk_inventory::{StockKey, StockRowId, StockStatus, StockThresholds};
use dealerdesk_invoicing::{InvoiceDocId, InvoiceKind, InvoiceStatus};
use dealerdesk_parties::{DealerId, TaxSlab, TaxSlabId};
use dealerdesk_pricing::TaxRates;
use dealerdesk_sales::{NewOrderLine, OrderId, OrderInvoiceStatus, OrderStatus};
use dealerdesk_sequence::{IdKind, Identifier, IdentifierAllocator};
use dealerdesk_settlement::{
    Allocation, CreditMemoId, CreditMemoStatus, PaymentDirection, PaymentId, PaymentInstrument,
};

use crate::event_store::InMemoryEventStore;
use crate::projections::DealerStatementProjection;
use crate::services::{
    DealerService, InventoryService, InvoiceService, OrderLineSpec, OrderService, PackingService,
    ServiceError, SettlementService, TaxSlabDirectory,
};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Harness {
    dealers: DealerService<Store, Bus>,
    inventory: InventoryService<Store, Bus>,
    orders: OrderService<Store, Bus>,
    packing: PackingService<Store, Bus>,
    invoices: InvoiceService<Store, Bus>,
    settlement: SettlementService<Store, Bus>,
    statements: Arc<DealerStatementProjection>,
    slab_id: TaxSlabId,
    store: Store,
    bus: Bus,
    slabs: Arc<TaxSlabDirectory>,
}

/// Wire the whole stack in memory. The dealer statement projection consumes
/// the bus from a background thread, exactly as a projection worker would.
fn setup() -> Harness {
    dealerdesk_observability::init_with_format(dealerdesk_observability::LogFormat::Pretty);

    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let slabs = Arc::new(TaxSlabDirectory::new());
    let allocator = Arc::new(IdentifierAllocator::new());
    let audit: Arc<dyn AuditSink> = Arc::new(NullAuditSink);

    let slab_id = TaxSlabId::new(AggregateId::new());
    slabs.register(TaxSlab::new(
        slab_id,
        "Ontario GST+HST",
        TaxRates::new(Rate::percent(5), Rate::percent(8), Rate::ZERO, Rate::ZERO),
    ));

    let statements = Arc::new(DealerStatementProjection::new());
    let subscription = bus.subscribe();
    let worker = statements.clone();
    thread::spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            let _ = worker.apply_envelope(&envelope);
        }
    });

    Harness {
        dealers: DealerService::new(store.clone(), bus.clone(), slabs.clone(), audit.clone()),
        inventory: InventoryService::new(store.clone(), bus.clone(), audit.clone()),
        orders: OrderService::new(store.clone(), bus.clone(), slabs.clone(), audit.clone()),
        packing: PackingService::new(store.clone(), bus.clone(), allocator.clone(), audit.clone()),
        invoices: InvoiceService::new(
            store.clone(),
            bus.clone(),
            allocator.clone(),
            slabs.clone(),
            audit.clone(),
        ),
        settlement: SettlementService::new(
            store.clone(),
            bus.clone(),
            allocator,
            audit,
        ),
        statements,
        slab_id,
        store,
        bus,
        slabs,
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for: {what}");
}

fn register_dealer(h: &Harness, discount_pct: u32) -> DealerId {
    let dealer_id = DealerId::new(AggregateId::new());
    h.dealers
        .register_dealer(
            dealer_id,
            "North Shore Motors",
            "12 Harbour Rd, Thunder Bay",
            Rate::percent(discount_pct),
            h.slab_id,
        )
        .unwrap();
    dealer_id
}

fn seed_stock(h: &Harness, sku_number: u32, quantity: i64) -> (StockRowId, Identifier) {
    let row_id = StockRowId::new(AggregateId::new());
    let sku = Identifier::new(IdKind::Sku, sku_number).unwrap();
    h.inventory
        .receive_stock(
            row_id,
            StockKey {
                product_id: ProductId::new(),
                child_sku: sku,
                location_id: LocationId::new(),
            },
            quantity,
        )
        .unwrap();
    (row_id, sku)
}

fn spec(sku: Identifier, quantity: i64, unit_price_cents: i64, row: StockRowId) -> OrderLineSpec {
    OrderLineSpec {
        line: NewOrderLine {
            product_id: ProductId::new(),
            child_sku: sku,
            quantity,
            unit_price: Money::from_cents(unit_price_cents),
            description: "Brake pad set".to_string(),
        },
        stock_row: row,
    }
}

fn place_order(
    h: &Harness,
    dealer: DealerId,
    po: &str,
    lines: Vec<OrderLineSpec>,
) -> OrderId {
    let order_id = OrderId::new(AggregateId::new());
    h.orders
        .create_order(order_id, dealer, po, lines, Money::ZERO, None)
        .unwrap();
    order_id
}

/// Approved order invoiced as a real invoice; returns the invoice stream id.
fn invoice_order(h: &Harness, dealer: DealerId, order_id: OrderId) -> InvoiceDocId {
    h.orders.approve_order(order_id).unwrap();
    let invoice_id = InvoiceDocId::new(AggregateId::new());
    h.invoices
        .issue_invoice(invoice_id, InvoiceKind::Invoice, dealer, &[order_id], Money::ZERO)
        .unwrap();
    invoice_id
}

fn pay(
    h: &Harness,
    dealer: DealerId,
    invoice_id: InvoiceDocId,
    cents: i64,
) -> Result<PaymentId, ServiceError> {
    let payment_id = PaymentId::new(AggregateId::new());
    h.settlement.create_payment(
        payment_id,
        dealer,
        Money::from_cents(cents),
        PaymentDirection::Credit,
        PaymentInstrument::Cash,
        None,
        vec![Allocation {
            invoice_id,
            amount: Money::from_cents(cents),
        }],
    )?;
    Ok(payment_id)
}

#[test]
fn order_pricing_matches_the_dealer_terms() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);

    // 2 x $40.00 at 10% discount under 5% GST + 8% HST.
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);

    let order = h.orders.load_order(order_id).unwrap();
    let totals = order.totals();
    assert_eq!(totals.total_before_tax, Money::from_cents(7_200));
    assert_eq!(totals.gst, Money::from_cents(360));
    assert_eq!(totals.hst, Money::from_cents(576));
    assert_eq!(totals.grand_total, Money::from_cents(8_136));

    // The booking landed in the same commit.
    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 2);
    assert_eq!(stock.available(), 3);
}

#[test]
fn overbooking_rejects_the_whole_order() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 10);

    place_order(&h, dealer, "PO-1", vec![spec(sku, 8, 2_500, row)]);

    // 3 more would exceed the 2 still available; nothing may land.
    let overbook = OrderId::new(AggregateId::new());
    let err = h
        .orders
        .create_order(
            overbook,
            dealer,
            "PO-2",
            vec![spec(sku, 3, 2_500, row)],
            Money::ZERO,
            None,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg)) if msg.contains("InsufficientStock")
    ));

    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 8);
    let rejected = h.orders.load_order(overbook).unwrap();
    assert!(rejected.dealer_id().is_none());

    // The failed attempt released its PO number; booking the remaining 2
    // under the same PO drains the row.
    place_order(&h, dealer, "PO-2", vec![spec(sku, 2, 2_500, row)]);
    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 10);
    assert_eq!(stock.available(), 0);
    assert_eq!(
        stock.status(StockThresholds::new(5, 2).unwrap()),
        StockStatus::OutOfStock
    );
}

#[test]
fn duplicate_po_numbers_are_rejected() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 10);

    place_order(&h, dealer, "PO-77", vec![spec(sku, 1, 1_000, row)]);

    let duplicate = OrderId::new(AggregateId::new());
    let err = h
        .orders
        .create_order(
            duplicate,
            dealer,
            "PO-77",
            vec![spec(sku, 1, 1_000, row)],
            Money::ZERO,
            None,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg)) if msg.contains("PO-77")
    ));
}

#[test]
fn invoicing_locks_the_order_and_raises_exposure() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    h.orders.approve_order(order_id).unwrap();

    let invoice_id = InvoiceDocId::new(AggregateId::new());
    let number = h
        .invoices
        .issue_invoice(invoice_id, InvoiceKind::Invoice, dealer, &[order_id], Money::ZERO)
        .unwrap();
    assert_eq!(number.to_string(), "INV0001");

    let invoice = h.invoices.load_invoice(invoice_id).unwrap();
    assert_eq!(invoice.due(), Money::from_cents(8_136));
    assert_eq!(invoice.status(), InvoiceStatus::Unpaid);

    let order = h.orders.load_order(order_id).unwrap();
    assert_eq!(order.invoice_status(), OrderInvoiceStatus::Invoiced);
    assert!(!order.is_modifiable());

    let dealer_state = h.dealers.load_dealer(dealer).unwrap();
    assert_eq!(
        dealer_state.balances().total_open_balance,
        Money::from_cents(8_136)
    );

    // A second invoice over the same order must bounce off the lock.
    let second = InvoiceDocId::new(AggregateId::new());
    let err = h
        .invoices
        .issue_invoice(second, InvoiceKind::Invoice, dealer, &[order_id], Money::ZERO)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvalidTransition(_))
    ));
}

#[test]
fn estimates_leave_orders_and_balances_untouched() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    h.orders.approve_order(order_id).unwrap();

    let estimate_id = InvoiceDocId::new(AggregateId::new());
    h.invoices
        .issue_invoice(estimate_id, InvoiceKind::Estimate, dealer, &[order_id], Money::ZERO)
        .unwrap();

    // The order stays invoiceable and the dealer owes nothing.
    let order = h.orders.load_order(order_id).unwrap();
    assert_eq!(order.invoice_status(), OrderInvoiceStatus::Pending);
    assert!(order.is_invoiceable());
    let dealer_state = h.dealers.load_dealer(dealer).unwrap();
    assert_eq!(dealer_state.balances().total_open_balance, Money::ZERO);

    // Estimates never accept money.
    let err = pay(&h, dealer, estimate_id, 1_000).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvalidTransition(_))
    ));
}

#[test]
fn overpayment_is_rejected_with_no_partial_state() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    pay(&h, dealer, invoice_id, 6_000).unwrap();

    // $50.00 against the remaining $21.36 must fail whole.
    let err = pay(&h, dealer, invoice_id, 5_000).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg)) if msg.contains("OverPayment")
    ));

    let invoice = h.invoices.load_invoice(invoice_id).unwrap();
    assert_eq!(invoice.paid(), Money::from_cents(6_000));
    assert_eq!(invoice.due(), Money::from_cents(2_136));
    assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);

    let dealer_state = h.dealers.load_dealer(dealer).unwrap();
    assert_eq!(dealer_state.balances().paid_amount, Money::from_cents(6_000));
    assert_eq!(
        dealer_state.balances().total_open_balance,
        Money::from_cents(2_136)
    );
}

#[test]
fn racing_payments_serialize_on_the_invoice_stream() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    // Two counters take $60.00 against the same $81.36 invoice at once. Both
    // load the same invoice version; the append must admit exactly one.
    let barrier = Barrier::new(2);
    let results: Vec<Result<PaymentId, ServiceError>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    pay(&h, dealer, invoice_id, 6_000)
                })
            })
            .collect();
        handles.into_iter().map(|j| j.join().unwrap()).collect()
    });

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1, "exactly one concurrent payment must commit");

    // The loser left no partial state on any stream.
    let invoice = h.invoices.load_invoice(invoice_id).unwrap();
    assert_eq!(invoice.paid(), Money::from_cents(6_000));
    assert_eq!(invoice.due(), Money::from_cents(2_136));
    assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
    let dealer_state = h.dealers.load_dealer(dealer).unwrap();
    assert_eq!(dealer_state.balances().paid_amount, Money::from_cents(6_000));
}

#[test]
fn credit_memo_redeems_exactly_once() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    let memo_id = CreditMemoId::new(AggregateId::new());
    let code = h
        .settlement
        .issue_credit_memo(memo_id, dealer, Money::from_cents(4_000), "returned core")
        .unwrap();
    assert_eq!(code.to_string(), "CRM0001");
    assert_eq!(
        h.settlement.validate_credit_memo(code, dealer).unwrap(),
        Money::from_cents(4_000)
    );

    let payment_id = PaymentId::new(AggregateId::new());
    h.settlement
        .create_payment(
            payment_id,
            dealer,
            Money::from_cents(4_000),
            PaymentDirection::Credit,
            PaymentInstrument::CreditMemo,
            Some(code),
            vec![Allocation {
                invoice_id,
                amount: Money::from_cents(4_000),
            }],
        )
        .unwrap();

    let memo = h.settlement.load_memo(memo_id).unwrap();
    assert_eq!(memo.status(), CreditMemoStatus::Redeemed);
    assert_eq!(memo.redeemed_by(), Some(payment_id));

    // Spending the same memo again fails and applies nothing.
    let err = h
        .settlement
        .create_payment(
            PaymentId::new(AggregateId::new()),
            dealer,
            Money::from_cents(4_000),
            PaymentDirection::Credit,
            PaymentInstrument::CreditMemo,
            Some(code),
            vec![Allocation {
                invoice_id,
                amount: Money::from_cents(4_000),
            }],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg)) if msg.contains("MemoAlreadyRedeemed")
    ));
    let invoice = h.invoices.load_invoice(invoice_id).unwrap();
    assert_eq!(invoice.paid(), Money::from_cents(4_000));
}

#[test]
fn memo_of_another_dealer_is_rejected() {
    let h = setup();
    let owner = register_dealer(&h, 0);
    let other = register_dealer(&h, 0);

    let memo_id = CreditMemoId::new(AggregateId::new());
    let code = h
        .settlement
        .issue_credit_memo(memo_id, owner, Money::from_cents(2_000), "goodwill")
        .unwrap();

    let err = h.settlement.validate_credit_memo(code, other).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg)) if msg.contains("MemoDealerMismatch")
    ));
}

#[test]
fn blank_cheque_number_rejects_the_payment() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    let err = h
        .settlement
        .create_payment(
            PaymentId::new(AggregateId::new()),
            dealer,
            Money::from_cents(1_000),
            PaymentDirection::Credit,
            PaymentInstrument::Cheque {
                check_number: "  ".to_string(),
                cheque_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            },
            None,
            vec![Allocation {
                invoice_id,
                amount: Money::from_cents(1_000),
            }],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(ref msg))
            if msg.contains("IncompletePaymentDetails")
    ));

    let invoice = h.invoices.load_invoice(invoice_id).unwrap();
    assert_eq!(invoice.paid(), Money::ZERO);
}

#[test]
fn packing_flow_checks_lines_and_completes() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1001", vec![spec(sku, 2, 3_000, row)]);

    // Packing is gated on approval; the failed attempt hands its PKG number
    // back, so the real draft still gets PKG0001.
    let slip_id = PackingSlipId::new(AggregateId::new());
    let err = h.packing.open_draft(slip_id, order_id).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvalidTransition(_))
    ));

    h.orders.approve_order(order_id).unwrap();
    let packing_id = h.packing.open_draft(slip_id, order_id).unwrap();
    assert_eq!(packing_id.to_string(), "PKG0001");

    h.packing.finalize(slip_id).unwrap();
    h.packing.scan(slip_id, sku).unwrap();
    // Re-scan of a checked line is a recognized no-op.
    h.packing.scan(slip_id, sku).unwrap();

    h.packing.complete(slip_id, "J. Moreau", false).unwrap();
    let slip = h.packing.load_slip(slip_id).unwrap();
    assert_eq!(slip.phase(), PackingPhase::Completed);
    assert!(!slip.has_unchecked_lines());
    assert_eq!(slip.signature(), Some("J. Moreau"));
    assert_eq!(slip.dealer_name(), "North Shore Motors");
    assert_eq!(slip.po_number(), "PO-1001");
}

#[test]
fn rejection_releases_booked_stock() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 10);
    let order_id = place_order(&h, dealer, "PO-1", vec![spec(sku, 4, 2_000, row)]);
    h.orders.approve_order(order_id).unwrap();

    h.orders.set_status(order_id, OrderStatus::Reject).unwrap();

    let order = h.orders.load_order(order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Reject);
    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 0);
    assert_eq!(stock.quantity(), 10);
    assert_eq!(stock.available(), 10);
}

#[test]
fn booking_release_survives_a_service_restart() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 10);
    let order_id = place_order(&h, dealer, "PO-1", vec![spec(sku, 4, 2_000, row)]);
    h.orders.approve_order(order_id).unwrap();

    // A fresh instance over the same store has no in-process state; the
    // reservations it releases must come off the order stream.
    let restarted = OrderService::new(
        h.store.clone(),
        h.bus.clone(),
        h.slabs.clone(),
        Arc::new(NullAuditSink) as Arc<dyn AuditSink>,
    );
    restarted.set_status(order_id, OrderStatus::Reject).unwrap();

    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 0);
    assert_eq!(stock.available(), 10);
}

#[test]
fn fulfillment_consumes_booked_stock() {
    let h = setup();
    let dealer = register_dealer(&h, 0);
    let (row, sku) = seed_stock(&h, 1, 10);
    let order_id = place_order(&h, dealer, "PO-1", vec![spec(sku, 4, 2_000, row)]);
    h.orders.approve_order(order_id).unwrap();

    h.orders.set_status(order_id, OrderStatus::Ready).unwrap();
    h.orders.set_status(order_id, OrderStatus::Shipped).unwrap();
    h.orders.set_status(order_id, OrderStatus::Fulfilled).unwrap();

    // Shipped goods leave both on-hand and booked counters.
    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.quantity(), 6);
    assert_eq!(stock.booked(), 0);
    assert_eq!(stock.available(), 6);
}

#[test]
fn dealer_statement_follows_invoices_and_payments() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 10);

    let order_id = place_order(&h, dealer, "PO-1", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    // An estimate over a second order must not reach the statement.
    let quoted = place_order(&h, dealer, "PO-2", vec![spec(sku, 1, 4_000, row)]);
    h.orders.approve_order(quoted).unwrap();
    h.invoices
        .issue_invoice(
            InvoiceDocId::new(AggregateId::new()),
            InvoiceKind::Estimate,
            dealer,
            &[quoted],
            Money::ZERO,
        )
        .unwrap();

    pay(&h, dealer, invoice_id, 6_000).unwrap();

    wait_until("statement reflects the payment", || {
        h.statements
            .get(dealer)
            .is_some_and(|s| s.paid_total == Money::from_cents(6_000))
    });

    let statement = h.statements.get(dealer).unwrap();
    assert_eq!(statement.invoiced_total, Money::from_cents(8_136));
    assert_eq!(statement.open_balance, Money::from_cents(2_136));
    assert_eq!(statement.open_invoice_count, 1);
    assert_eq!(statement.dealer_name, "North Shore Motors");
}

#[test]
fn soft_delete_is_blocked_until_the_invoice_settles() {
    let h = setup();
    let dealer = register_dealer(&h, 10);
    let (row, sku) = seed_stock(&h, 1, 5);
    let order_id = place_order(&h, dealer, "PO-1", vec![spec(sku, 2, 4_000, row)]);
    let invoice_id = invoice_order(&h, dealer, order_id);

    let err = h
        .orders
        .soft_delete_order(order_id, Some(invoice_id))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Conflict(ref msg))
            if msg.contains("OrderHasActiveInvoice")
    ));

    pay(&h, dealer, invoice_id, 8_136).unwrap();
    h.orders.soft_delete_order(order_id, Some(invoice_id)).unwrap();

    let order = h.orders.load_order(order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Deleted);
    // Remaining bookings came back with the deletion.
    let stock = h.inventory.load_row(row).unwrap();
    assert_eq!(stock.booked(), 0);
}
