//! Deployment lifecycle tests
//!
//! Exercises the coordinator against the mock engine: fresh deployment,
//! idempotent re-invocation, concurrent callers, the recognized
//! idempotency races, and the failure paths that must surface the
//! engine's literal status text.

mod fixtures;

use std::sync::Arc;

use delay_lane::deploy::DeployError;
use delay_lane::engine::Operation;
use delay_lane::schema;
use delay_lane::{DeployOutcome, RemoteCallError};

use fixtures::{lane, lane_with_big_model, lane_with_small_model, model_archive, plan_resources};

// =============================================================================
// Fresh deployment
// =============================================================================

#[test]
fn fresh_deploy_ends_present_and_probe_succeeds() {
    let lane = lane_with_big_model();

    let outcome = lane.coordinator.deploy(&schema::flight_plan()).unwrap();
    assert_eq!(outcome, DeployOutcome::Deployed);

    // Both procedures exist and the probe row scores.
    let probe = lane
        .client
        .call(schema::SCORING_PROCEDURE, &schema::probe_args())
        .unwrap();
    assert!(probe.is_success());
    assert_eq!(probe.rows.len(), 1);
    assert!(probe.rows[0].contains_key("LABEL"));

    let procedures = lane.engine.procedures();
    assert!(procedures.contains(&schema::SCORING_PROCEDURE.to_string()));
    assert!(procedures.contains(&schema::CACHE_CHECK_PROCEDURE.to_string()));

    // Every plan statement was applied in order.
    let plan = schema::flight_plan();
    let applied = lane.engine.applied_statements();
    assert_eq!(applied.len(), plan.statements.len());
    assert_eq!(applied[0], plan.statements[0].text);
}

#[test]
fn oversized_model_ships_as_numbered_fragments_plus_main_bundle() {
    let lane = lane_with_big_model();
    let archive = model_archive(150_000);
    let expected_fragments = archive.len() / schema::MAX_CHUNK_BYTES + 1;

    lane.coordinator.deploy(&schema::flight_plan()).unwrap();

    // One bundle per fragment, then the main code bundle.
    assert_eq!(lane.engine.bundle_count(), expected_fragments + 1);

    let names = lane.engine.resource_names();
    for index in 0..expected_fragments {
        let fragment = format!(
            "{}/{}.{}",
            schema::RESOURCE_NAMESPACE,
            schema::MODEL_ARTIFACT,
            index
        );
        assert!(names.contains(&fragment), "missing {}", fragment);
    }
    assert!(names.contains(&format!(
        "{}/{}",
        schema::RESOURCE_NAMESPACE,
        schema::SCORING_PROC_CODE
    )));

    // The uploaded fragments concatenate back to the original archive.
    let mut joined = Vec::new();
    for index in 0..expected_fragments {
        let fragment = format!(
            "{}/{}.{}",
            schema::RESOURCE_NAMESPACE,
            schema::MODEL_ARTIFACT,
            index
        );
        joined.extend(lane.engine.resource(&fragment).unwrap());
    }
    assert_eq!(joined, archive);
}

#[test]
fn small_model_rides_in_the_main_bundle_unsplit() {
    let lane = lane_with_small_model();

    lane.coordinator.deploy(&schema::flight_plan()).unwrap();

    assert_eq!(lane.engine.bundle_count(), 1);
    let names = lane.engine.resource_names();
    assert!(names.contains(&format!(
        "{}/{}",
        schema::RESOURCE_NAMESPACE,
        schema::MODEL_ARTIFACT
    )));
    assert!(!names
        .iter()
        .any(|n| n.ends_with(".0")), "nothing should be fragmented: {:?}", names);
}

// =============================================================================
// Idempotency
// =============================================================================

#[test]
fn second_deploy_performs_zero_uploads_and_zero_statements() {
    let lane = lane_with_big_model();
    let plan = schema::flight_plan();

    lane.coordinator.deploy(&plan).unwrap();
    let uploads = lane.engine.upload_count();
    let statements = lane.engine.ad_hoc_count();

    let outcome = lane.coordinator.deploy(&plan).unwrap();
    assert_eq!(outcome, DeployOutcome::AlreadyPresent);
    assert_eq!(lane.engine.upload_count(), uploads);
    assert_eq!(lane.engine.ad_hoc_count(), statements);
}

#[test]
fn concurrent_deploys_apply_the_schema_exactly_once() {
    let lane = lane_with_big_model();
    let plan = Arc::new(schema::flight_plan());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = Arc::clone(&lane.coordinator);
            let plan = Arc::clone(&plan);
            std::thread::spawn(move || coordinator.deploy(&plan).unwrap())
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let deployed = outcomes
        .iter()
        .filter(|o| **o == DeployOutcome::Deployed)
        .count();
    assert_eq!(deployed, 1, "outcomes: {:?}", outcomes);
    assert_eq!(lane.engine.ad_hoc_count(), plan.statements.len());
}

#[test]
fn separate_coordinators_converge_on_one_schema() {
    // Two coordinators against one engine stand in for two processes: no
    // lock is shared between them, only the probe protocol.
    use delay_lane::deploy::DeployConfig;
    use delay_lane::engine::{EngineClient, MockTransport, Transport};
    use delay_lane::DeploymentCoordinator;

    let first = lane_with_big_model();
    let plan = schema::flight_plan();

    let second_transport: Arc<dyn Transport> =
        Arc::new(MockTransport::new(Arc::clone(&first.engine)));
    let second = DeploymentCoordinator::with_config(
        Arc::new(EngineClient::new(second_transport)),
        Arc::new(plan_resources(model_archive(150_000))),
        DeployConfig::with_max_chunk_bytes(schema::MAX_CHUNK_BYTES),
    );

    assert_eq!(
        first.coordinator.deploy(&plan).unwrap(),
        DeployOutcome::Deployed
    );
    assert_eq!(second.deploy(&plan).unwrap(), DeployOutcome::AlreadyPresent);
    assert_eq!(first.engine.ad_hoc_count(), plan.statements.len());
}

#[test]
fn already_exists_during_schema_apply_is_success() {
    let lane = lane_with_big_model();
    let plan = schema::flight_plan();

    // Another writer created the first object between our probe miss and
    // our statement application.
    let response = lane.client.ad_hoc(&plan.statements[0].text).unwrap();
    assert!(response.is_success());

    let outcome = lane.coordinator.deploy(&plan).unwrap();
    assert_eq!(outcome, DeployOutcome::AlreadyPresent);
}

#[test]
fn ambiguous_probe_failure_is_logged_and_treated_as_absent() {
    let lane = lane_with_big_model();

    // The probe fails with something other than the engine's not-found
    // text; deployment proceeds anyway.
    lane.engine
        .inject_failure(Operation::Call, "Connection to node 3 lost");

    let outcome = lane.coordinator.deploy(&schema::flight_plan()).unwrap();
    assert_eq!(outcome, DeployOutcome::Deployed);
}

// =============================================================================
// Failure paths
// =============================================================================

#[test]
fn upload_failure_aborts_with_the_engine_status_text() {
    let lane = lane_with_big_model();
    lane.engine
        .inject_failure(Operation::UpdateClasses, "disk full on node 2");

    let err = lane.coordinator.deploy(&schema::flight_plan()).unwrap_err();
    match err {
        DeployError::BundleUpload { status_text, .. } => {
            assert_eq!(status_text, "disk full on node 2");
        }
        other => panic!("expected BundleUpload, got {:?}", other),
    }

    // Nothing was applied after the aborted upload.
    assert_eq!(lane.engine.ad_hoc_count(), 0);
}

#[test]
fn statement_failure_aborts_with_statement_and_status_text() {
    let lane = lane_with_big_model();
    lane.engine
        .inject_failure(Operation::AdHoc, "Syntax error near TTL");

    let err = lane.coordinator.deploy(&schema::flight_plan()).unwrap_err();
    match err {
        DeployError::SchemaApply {
            statement,
            status_text,
        } => {
            assert!(statement.contains("cached_results"));
            assert_eq!(status_text, "Syntax error near TTL");
        }
        other => panic!("expected SchemaApply, got {:?}", other),
    }
}

#[test]
fn transport_failure_mid_deploy_surfaces_as_remote_call_error() {
    let lane = lane_with_big_model();
    lane.transport
        .fail_next_op(Operation::UpdateClasses, "broken pipe");

    let err = lane.coordinator.deploy(&schema::flight_plan()).unwrap_err();
    assert!(matches!(
        err,
        DeployError::RemoteCall(RemoteCallError::Transport(_))
    ));
    assert!(err.to_string().contains("broken pipe"));
}

#[test]
fn verification_failure_when_probe_never_succeeds() {
    let lane = lane_with_big_model();

    // The plan's statements never create the probe procedure, so every
    // step succeeds yet the final probe still misses.
    let mut plan = schema::flight_plan();
    plan.probe.procedure = "GhostProc".to_string();

    let err = lane.coordinator.deploy(&plan).unwrap_err();
    assert!(
        matches!(err, DeployError::Verification { ref procedure } if procedure == "GhostProc"),
        "got {:?}",
        err
    );
}

#[test]
fn missing_local_resource_fails_before_any_upload() {
    let lane = lane(delay_lane::resource::MemoryLocator::new());

    let err = lane.coordinator.deploy(&schema::flight_plan()).unwrap_err();
    assert!(matches!(err, DeployError::Artifact(_)));
    assert_eq!(lane.engine.upload_count(), 0);
    assert_eq!(lane.engine.ad_hoc_count(), 0);
}
