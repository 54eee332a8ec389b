use super::*;

#[test]
fn code_matches_variant() {
    assert_eq!(
        EngineError::invalid_argument("x").code(),
        ErrorCode::InvalidArgument
    );
    assert_eq!(EngineError::Cancelled.code(), ErrorCode::Cancelled);
    assert_eq!(EngineError::internal("x").code(), ErrorCode::InternalError);
}

#[test]
fn reclassify_cancellation_recodes_on_flag() {
    let err = EngineError::internal("psql failed after cancel");
    let reclassified = err.reclassify_cancellation(true);
    assert_eq!(reclassified.code(), ErrorCode::Cancelled);
}

#[test]
fn reclassify_cancellation_recodes_on_message_heuristic() {
    let err = EngineError::internal("subprocess reported cancel mid-flight");
    let reclassified = err.reclassify_cancellation(false);
    assert_eq!(reclassified.code(), ErrorCode::Cancelled);
}

#[test]
fn reclassify_cancellation_leaves_unrelated_errors_alone() {
    let err = EngineError::internal("disk full");
    let reclassified = err.reclassify_cancellation(false);
    assert_eq!(reclassified.code(), ErrorCode::InternalError);
}

#[test]
fn to_detail_carries_source_as_details() {
    let source = std::io::Error::new(std::io::ErrorKind::Other, "boom");
    let err = EngineError::internal_with_source("cannot clone state", source);
    let detail = err.to_detail();
    assert_eq!(detail.code, ErrorCode::InternalError);
    assert_eq!(detail.message, "cannot clone state");
    assert_eq!(detail.details.as_deref(), Some("boom"));
}
