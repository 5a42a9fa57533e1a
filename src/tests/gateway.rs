//! Named-parameter rewriting and interpolation rejection tests.

use crate::error::AegisError;
use crate::store::gateway::rewrite_named_params;
use tokio_postgres::types::ToSql;

#[test]
fn rewrites_named_placeholders_in_order() {
    let bank_id = 5i32;
    let quarter = "Q2";
    let params: [(&str, &(dyn ToSql + Sync)); 2] = [("bank_id", &bank_id), ("quarter", &quarter)];
    let (sql, ordered) = rewrite_named_params(
        "SELECT * FROM t WHERE bank_id = :bank_id AND quarter = :quarter",
        &params,
    )
    .expect("rewrites");

    assert_eq!(sql, "SELECT * FROM t WHERE bank_id = $1 AND quarter = $2");
    assert_eq!(ordered.len(), 2);
}

#[test]
fn repeated_placeholder_reuses_one_position() {
    let fy = 2025i32;
    let params: [(&str, &(dyn ToSql + Sync)); 1] = [("fy", &fy)];
    let (sql, ordered) = rewrite_named_params(
        "SELECT * FROM t WHERE fy = :fy OR prior_fy = :fy",
        &params,
    )
    .expect("rewrites");

    assert_eq!(sql, "SELECT * FROM t WHERE fy = $1 OR prior_fy = $1");
    assert_eq!(ordered.len(), 1);
}

#[test]
fn type_casts_are_left_alone() {
    let v = "x";
    let (sql, _) = rewrite_named_params(
        "SELECT :value::text FROM t",
        &[("value", &v)],
    )
    .expect("rewrites");
    assert_eq!(sql, "SELECT $1::text FROM t");
}

#[test]
fn unbound_placeholder_is_rejected() {
    let err = rewrite_named_params("SELECT * FROM t WHERE id = :id", &[]).unwrap_err();
    assert!(matches!(err, AegisError::Invariant { .. }));
}

#[test]
fn unused_binding_is_rejected() {
    let v = 1i32;
    let err = rewrite_named_params("SELECT 1", &[("orphan", &v)]).unwrap_err();
    assert!(matches!(err, AegisError::Invariant { .. }));
}

#[test]
fn interpolation_braces_are_rejected() {
    // A query assembled with format!-style interpolation of a caller
    // value must never reach the wire.
    let err = rewrite_named_params("SELECT * FROM t WHERE name = '{user_input}'", &[])
        .unwrap_err();
    assert!(matches!(err, AegisError::Invariant { .. }));
}

#[test]
fn no_parameters_passes_through() {
    let (sql, ordered) =
        rewrite_named_params("SELECT count(*) FROM t", &[]).expect("rewrites");
    assert_eq!(sql, "SELECT count(*) FROM t");
    assert!(ordered.is_empty());
}
