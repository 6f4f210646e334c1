//! Tests for parsing provider payloads into bank domain models.

use crate::bank::{ExternalTransaction, RequisitionStatus};
use crate::errors::Error;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;

#[test]
fn test_requisition_status_from_provider_codes() {
    assert_eq!(RequisitionStatus::from_provider("LN"), RequisitionStatus::Linked);
    assert_eq!(RequisitionStatus::from_provider("ex"), RequisitionStatus::Expired);
    assert_eq!(RequisitionStatus::from_provider("RJ"), RequisitionStatus::Error);
    assert_eq!(RequisitionStatus::from_provider("SU"), RequisitionStatus::Error);
    assert_eq!(RequisitionStatus::from_provider("CR"), RequisitionStatus::Created);
    assert_eq!(RequisitionStatus::from_provider("GA"), RequisitionStatus::Created);
    assert_eq!(RequisitionStatus::from_provider("linked"), RequisitionStatus::Linked);
}

#[test]
fn test_requisition_status_round_trips_through_str() {
    for status in [
        RequisitionStatus::Created,
        RequisitionStatus::Linked,
        RequisitionStatus::Expired,
        RequisitionStatus::Error,
    ] {
        assert_eq!(status.as_str().parse::<RequisitionStatus>().unwrap(), status);
    }
    assert!("LN".parse::<RequisitionStatus>().is_err());
}

#[test]
fn test_parse_debit_transaction() {
    let payload = json!({
        "transactionId": "2024031401927-1",
        "bookingDate": "2024-03-14",
        "valueDate": "2024-03-15",
        "transactionAmount": { "amount": "-24.50", "currency": "eur" },
        "creditorName": "Corner Bakery",
        "debtorName": "Jane Doe",
        "remittanceInformationUnstructured": "CARD PAYMENT CORNER BAKERY"
    });

    let tx = ExternalTransaction::from_payload(payload.clone()).unwrap();

    assert_eq!(tx.transaction_id, "2024031401927-1");
    assert_eq!(tx.booking_date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    assert_eq!(tx.amount, dec!(-24.50));
    assert_eq!(tx.currency, "EUR");
    assert_eq!(tx.counterparty_name.as_deref(), Some("Corner Bakery"));
    assert_eq!(
        tx.remittance_unstructured.as_deref(),
        Some("CARD PAYMENT CORNER BAKERY")
    );
    assert!(tx.remittance_structured.is_none());
    assert_eq!(tx.raw_payload, payload);
}

#[test]
fn test_parse_credit_uses_debtor_and_array_remittance() {
    let payload = json!({
        "internalTransactionId": "int-77",
        "valueDate": "2024-02-28T10:00:00Z",
        "transactionAmount": { "amount": 3500, "currency": "EUR" },
        "debtorName": "ACME Payroll",
        "remittanceInformationUnstructuredArray": ["SALARY", " FEB 2024 "]
    });

    let tx = ExternalTransaction::from_payload(payload).unwrap();

    assert_eq!(tx.transaction_id, "int-77");
    assert_eq!(tx.booking_date, NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
    assert_eq!(tx.amount, dec!(3500));
    assert_eq!(tx.counterparty_name.as_deref(), Some("ACME Payroll"));
    assert_eq!(tx.remittance_unstructured.as_deref(), Some("SALARY FEB 2024"));
}

#[test]
fn test_parse_rejects_missing_identifier() {
    let payload = json!({
        "bookingDate": "2024-03-14",
        "transactionAmount": { "amount": "-1.00", "currency": "EUR" }
    });

    let err = ExternalTransaction::from_payload(payload).unwrap_err();
    assert!(matches!(err, Error::Mapping(_)));
}

#[test]
fn test_parse_rejects_unparseable_amount() {
    let payload = json!({
        "transactionId": "tx-1",
        "bookingDate": "2024-03-14",
        "transactionAmount": { "amount": "twelve", "currency": "EUR" }
    });

    let err = ExternalTransaction::from_payload(payload).unwrap_err();
    assert!(matches!(err, Error::Mapping(msg) if msg.contains("tx-1")));
}

#[test]
fn test_payload_ref_prefers_transaction_id() {
    let with_id = json!({ "transactionId": "abc" });
    let without_id = json!({ "bookingDate": "2024-01-01" });

    assert_eq!(ExternalTransaction::payload_ref(&with_id, 3), "#3 (abc)");
    assert_eq!(ExternalTransaction::payload_ref(&without_id, 4), "#4");
}
