//! Flight-delay deployment plan
//!
//! The concrete schema this lane deploys: a result cache keyed by the
//! full request tuple with a five-minute retention window, a cache
//! effectiveness view, and the scoring procedures. The DDL could be fed
//! to the engine's SQL console by hand; it lives here so a fresh target
//! bootstraps itself.

use crate::deploy::{ProbeSpec, SchemaDeploymentPlan, SchemaStatement};

/// Logical name of the model artifact resource.
pub const MODEL_ARTIFACT: &str = "gbm_flight_model.tar.gz";

/// Compiled scoring procedure resource.
pub const SCORING_PROC_CODE: &str = "is_flight_late.proc";

/// Name of the deployed scoring procedure.
pub const SCORING_PROCEDURE: &str = "IsFlightLate";

/// Name of the cache statistics procedure.
pub const CACHE_CHECK_PROCEDURE: &str = "check_cache";

/// Path prefix resources get inside bundles. The deployed procedure
/// resolves the model artifact under the same prefix at runtime.
pub const RESOURCE_NAMESPACE: &str = "procs";

/// Id of the main code/resource bundle.
pub const MAIN_BUNDLE_ID: &str = "flight-procs";

/// Chunk ceiling used in the reference deployment, in bytes.
pub const MAX_CHUNK_BYTES: usize = 50_000;

/// Fixed probe row: a historical flight that every model revision can
/// score. Argument order matches the procedure signature.
pub fn probe_args() -> Vec<String> {
    ["SAN", "0730", "1987", "10", "14", "3", "PS", "SFO"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// The full deployment plan for the flight-delay schema.
pub fn flight_plan() -> SchemaDeploymentPlan {
    let statements = vec![
        SchemaStatement::new(
            "CREATE TABLE cached_results (origin varchar(20) NOT NULL, dest varchar(20) NOT NULL, \
             crsdeptime varchar(4) NOT NULL, year varchar(4) NOT NULL, month varchar(2) NOT NULL, \
             dayofmonth varchar(2) NOT NULL, dayofweek varchar(1) NOT NULL, \
             uniquecarrier varchar(2) NOT NULL, delayed varchar(3) NOT NULL, \
             last_used timestamp NOT NULL, usage_count bigint NOT NULL, \
             PRIMARY KEY (origin, dest, crsdeptime, year, month, dayofmonth, dayofweek, uniquecarrier)) \
             USING TTL 5 MINUTES ON COLUMN last_used;",
        ),
        SchemaStatement::new("CREATE INDEX cached_results_ttl_idx ON cached_results (last_used);"),
        SchemaStatement::new("PARTITION TABLE cached_results ON COLUMN origin;"),
        SchemaStatement::new(
            "CREATE VIEW cache_effectiveness AS SELECT usage_count, COUNT(*) hits \
             FROM cached_results GROUP BY usage_count;",
        ),
        SchemaStatement::with_bundles(
            "CREATE PROCEDURE IsFlightLate PARTITION ON TABLE cached_results COLUMN origin \
             FROM CLASS procs.is_flight_late;",
            // The procedure reads the model artifact lazily at runtime, so
            // its fragments must be on the engine before the procedure is.
            &[MAIN_BUNDLE_ID, MODEL_ARTIFACT],
        ),
        SchemaStatement::new(
            "CREATE PROCEDURE check_cache AS SELECT * FROM cache_effectiveness;",
        ),
    ];

    SchemaDeploymentPlan {
        statements,
        code_resources: vec![SCORING_PROC_CODE.to_string()],
        data_resources: vec![MODEL_ARTIFACT.to_string()],
        resource_namespace: RESOURCE_NAMESPACE.to_string(),
        main_bundle_id: MAIN_BUNDLE_ID.to_string(),
        probe: ProbeSpec {
            procedure: SCORING_PROCEDURE.to_string(),
            args: probe_args(),
        },
    }
}

/// Origin airports from the training dataset.
pub fn origins() -> &'static [&'static str] {
    &[
        "ABE", "ABQ", "ACY", "ALB", "AMA", "ANC", "ATL", "AUS", "AVP", "BDL", "BGM", "BHM",
        "BIL", "BNA", "BOI", "BOS", "BTV", "BUF", "BUR", "BWI", "CAE", "CHO", "CHS", "CLE",
        "CLT", "CMH", "COS", "CRP", "CRW", "CVG", "DAL", "DAY", "DCA", "DEN", "DFW", "DSM",
        "DTW", "EGE", "ELP", "ERI", "EWR", "EYW", "FLL", "GEG", "GNV", "GRR", "GSO", "HNL",
        "HOU", "HPN", "HRL", "IAD", "IAH", "ICT", "IND", "ISP", "JAN", "JAX", "JFK", "KOA",
        "LAN", "LAS", "LAX", "LBB", "LEX", "LGA", "LIH", "LIT", "LYH", "MAF", "MCI", "MCO",
        "MDT", "MDW", "MEM", "MFR", "MHT", "MIA", "MKE", "MLB", "MRY", "MSP", "MSY", "MYR",
        "OAK", "OGG", "OKC", "OMA", "ONT", "ORD", "ORF", "PBI", "PDX", "PHF", "PHL", "PHX",
        "PIT", "PSP", "PVD", "PWM", "RDU", "RIC", "RNO", "ROA", "ROC", "RSW", "SAN", "SAT",
        "SAV", "SBN", "SCK", "SDF", "SEA", "SFO", "SJC", "SJU", "SLC", "SMF", "SNA", "SRQ",
        "STL", "STT", "STX", "SWF", "SYR", "TLH", "TPA", "TRI", "TUL", "TUS", "TYS", "UCA",
    ]
}

/// Destination airports from the training dataset.
pub fn dests() -> &'static [&'static str] {
    &[
        "ABE", "ABQ", "ACY", "ALB", "AMA", "ANC", "ATL", "AUS", "AVL", "AVP", "BDL", "BGM",
        "BHM", "BNA", "BOI", "BOS", "BTV", "BUF", "BUR", "BWI", "CAE", "CAK", "CHA", "CHO",
        "CHS", "CLE", "CLT", "CMH", "COS", "CRP", "CVG", "DAL", "DAY", "DCA", "DEN", "DFW",
        "DSM", "DTW", "ELM", "ELP", "ERI", "EUG", "EWR", "EYW", "FAT", "FAY", "FLL", "FNT",
        "GEG", "GRR", "GSO", "GSP", "HNL", "HOU", "HPN", "HRL", "HTS", "IAD", "IAH", "ICT",
        "ILM", "IND", "ISP", "JAN", "JAX", "JFK", "KOA", "LAS", "LAX", "LBB", "LEX", "LGA",
        "LIH", "LIT", "LYH", "MAF", "MCI", "MCO", "MDT", "MDW", "MHT", "MIA", "MKE", "MRY",
        "MSP", "MSY", "MYR", "OAJ", "OAK", "OGG", "OKC", "OMA", "ONT", "ORD", "ORF", "ORH",
        "PBI", "PDX", "PHF", "PHL", "PHX", "PIT", "PNS", "PSP", "PVD", "PWM", "RDU", "RIC",
        "RNO", "ROA", "ROC", "RSW", "SAN", "SAT", "SBN", "SCK", "SDF", "SEA", "SFO", "SJC",
        "SJU", "SLC", "SMF", "SNA", "SRQ", "STL", "STT", "SWF", "SYR", "TOL", "TPA", "TUL",
        "TUS", "UCA",
    ]
}
