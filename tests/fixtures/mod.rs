//! Shared test fixtures
//!
//! Builds model archives of controllable size and wires a full lane
//! (mock engine, transport, client, coordinator) around an in-memory
//! resource locator.

// Each integration test binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use delay_lane::deploy::DeployConfig;
use delay_lane::engine::{EngineClient, MockTransport};
use delay_lane::mock::MockEngine;
use delay_lane::resource::MemoryLocator;
use delay_lane::schema;
use delay_lane::DeploymentCoordinator;

/// Everything a test needs to drive a deployment end to end.
pub struct Lane {
    pub engine: Arc<MockEngine>,
    pub transport: Arc<MockTransport>,
    pub client: Arc<EngineClient>,
    pub coordinator: Arc<DeploymentCoordinator>,
}

/// Incompressible pseudo-random payload so archive sizes track input
/// sizes (and always exceed the chunk ceiling when we want them to).
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

/// A gzip-compressed tar archive shaped like a model artifact.
pub fn model_archive(weights_len: usize) -> Vec<u8> {
    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);

    for (name, content) in [
        ("model.ini", b"algo = gbm\n".to_vec()),
        ("weights.bin", noise(weights_len)),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(content.len() as u64);
        header.set_mtime(0);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content.as_slice()).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Local resources for the reference plan: compiled procedure code plus
/// a model artifact with the given archive bytes.
pub fn plan_resources(archive: Vec<u8>) -> MemoryLocator {
    MemoryLocator::new()
        .with(schema::SCORING_PROC_CODE, noise(1_000))
        .with(schema::MODEL_ARTIFACT, archive)
}

/// Wire a lane around the given local resources with the reference
/// 50 kB chunk ceiling.
pub fn lane(locator: MemoryLocator) -> Lane {
    let engine = Arc::new(MockEngine::new());
    let transport = Arc::new(MockTransport::new(Arc::clone(&engine)));
    let client = Arc::new(EngineClient::new(
        Arc::clone(&transport) as Arc<dyn delay_lane::engine::Transport>
    ));
    let coordinator = Arc::new(DeploymentCoordinator::with_config(
        Arc::clone(&client),
        Arc::new(locator),
        DeployConfig::with_max_chunk_bytes(schema::MAX_CHUNK_BYTES),
    ));

    Lane {
        engine,
        transport,
        client,
        coordinator,
    }
}

/// A lane whose model artifact comfortably exceeds the chunk ceiling.
pub fn lane_with_big_model() -> Lane {
    lane(plan_resources(model_archive(150_000)))
}

/// A lane whose model artifact fits in a single upload.
pub fn lane_with_small_model() -> Lane {
    lane(plan_resources(model_archive(1_000)))
}
