//! Shared helpers for the database-backed integration suites.
//!
//! These tests execute against a real Postgres instance (set DATABASE_URL)
//! to catch schema drift; the schema is applied idempotently on connect.

use std::sync::{Arc, Once};

use sqlx::PgPool;
use uuid::Uuid;

use landloan_workflow::{
    InMemoryBlobStore, LoanWorkflow, SelfAssign, SiteWorkflow, WorkflowConfig,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "landloan_workflow=debug".into()),
            )
            .with_test_writer()
            .init();
    });
}

pub async fn test_pool() -> PgPool {
    init_tracing();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::raw_sql(include_str!("../../migrations/0001_workflow_tables.sql"))
        .execute(&pool)
        .await
        .expect("Failed to apply schema");

    pool
}

/// Seeded reference-data ids for one test
pub struct ReferenceIds {
    pub package_id: Uuid,
    pub sector_id: Uuid,
    pub branch_id: Uuid,
    pub guarantor_id: Uuid,
    pub second_guarantor_id: Uuid,
    pub investor_id: Uuid,
}

pub async fn seed_reference_data(pool: &PgPool) -> ReferenceIds {
    let ids = ReferenceIds {
        package_id: Uuid::new_v4(),
        sector_id: Uuid::new_v4(),
        branch_id: Uuid::new_v4(),
        guarantor_id: Uuid::new_v4(),
        second_guarantor_id: Uuid::new_v4(),
        investor_id: Uuid::new_v4(),
    };

    sqlx::query("INSERT INTO packages (package_id, name) VALUES ($1, 'Standard Plot Loan')")
        .bind(ids.package_id)
        .execute(pool)
        .await
        .expect("Failed to seed package");
    sqlx::query("INSERT INTO sectors (sector_id, name) VALUES ($1, 'Residential')")
        .bind(ids.sector_id)
        .execute(pool)
        .await
        .expect("Failed to seed sector");
    sqlx::query("INSERT INTO branches (branch_id, name) VALUES ($1, 'Head Office')")
        .bind(ids.branch_id)
        .execute(pool)
        .await
        .expect("Failed to seed branch");
    sqlx::query("INSERT INTO guarantors (guarantor_id, full_name) VALUES ($1, 'Joseph Mwita')")
        .bind(ids.guarantor_id)
        .execute(pool)
        .await
        .expect("Failed to seed guarantor");
    sqlx::query("INSERT INTO guarantors (guarantor_id, full_name) VALUES ($1, 'Neema Said')")
        .bind(ids.second_guarantor_id)
        .execute(pool)
        .await
        .expect("Failed to seed second guarantor");
    sqlx::query("INSERT INTO investors (investor_id, full_name) VALUES ($1, 'Upendo Fund')")
        .bind(ids.investor_id)
        .execute(pool)
        .await
        .expect("Failed to seed investor");

    ids
}

pub struct LoanHarness {
    pub workflow: LoanWorkflow,
    pub blob: Arc<InMemoryBlobStore>,
    pub refs: ReferenceIds,
    pub pool: PgPool,
}

pub async fn loan_harness() -> LoanHarness {
    let pool = test_pool().await;
    let refs = seed_reference_data(&pool).await;
    let blob = Arc::new(InMemoryBlobStore::new());
    let workflow = LoanWorkflow::new(
        pool.clone(),
        blob.clone(),
        Arc::new(SelfAssign),
        WorkflowConfig::default(),
    );
    LoanHarness {
        workflow,
        blob,
        refs,
        pool,
    }
}

pub struct SiteHarness {
    pub workflow: SiteWorkflow,
    pub blob: Arc<InMemoryBlobStore>,
    pub refs: ReferenceIds,
    pub pool: PgPool,
}

pub async fn site_harness() -> SiteHarness {
    let pool = test_pool().await;
    let refs = seed_reference_data(&pool).await;
    let blob = Arc::new(InMemoryBlobStore::new());
    let workflow = SiteWorkflow::new(
        pool.clone(),
        blob.clone(),
        Arc::new(SelfAssign),
        WorkflowConfig::default(),
    );
    SiteHarness {
        workflow,
        blob,
        refs,
        pool,
    }
}
