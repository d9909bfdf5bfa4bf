use sqlx::Executor;
use thiserror::Error;

use crate::connection::DbPool;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Expected row counts after seeding, checked by [`AcademicSeedDataset::verify`].
const SEED_CONTRACT: &[SeedCheck] = &[
    SeedCheck {
        label: "careers-active",
        query: "SELECT COUNT(1) FROM carreras WHERE activa = 1",
        expected: 6,
    },
    SeedCheck {
        label: "careers-total",
        query: "SELECT COUNT(1) FROM carreras",
        expected: 7,
    },
    SeedCheck {
        label: "students-active",
        query: "SELECT COUNT(1) FROM alumnos WHERE estado_alumno = 'activo'",
        expected: 11,
    },
    SeedCheck {
        label: "students-below-seven",
        query: "SELECT COUNT(1) FROM alumnos \
                WHERE estado_alumno = 'activo' AND promedio_general < 7.0",
        expected: 3,
    },
    SeedCheck {
        label: "teachers-active",
        query: "SELECT COUNT(1) FROM profesores WHERE activo = 1",
        expected: 3,
    },
    SeedCheck {
        label: "risk-reports-open",
        query: "SELECT COUNT(1) FROM reportes_riesgo WHERE estado IN ('abierto', 'en_proceso')",
        expected: 4,
    },
    SeedCheck {
        label: "risk-reports-urgent",
        query: "SELECT COUNT(1) FROM reportes_riesgo \
                WHERE estado IN ('abierto', 'en_proceso') AND nivel_riesgo IN ('alto', 'critico')",
        expected: 3,
    },
];

const SEED_TABLES: &[&str] = &["reportes_riesgo", "profesores", "alumnos", "carreras", "usuarios"];

#[derive(Debug, Clone, Copy)]
struct SeedCheck {
    label: &'static str,
    query: &'static str,
    expected: i64,
}

/// Deterministic demo dataset: careers, students, teachers and risk reports.
pub struct AcademicSeedDataset;

impl AcademicSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/academic_seed.sql");

    /// Loads the dataset in one transaction. Fails on a database that already holds it.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, SeedError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let mut tables = Vec::with_capacity(SEED_TABLES.len());
        for &table in SEED_TABLES.iter().rev() {
            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}"))
                .fetch_one(pool)
                .await?;
            tables.push(TableSeedInfo { table, rows });
        }
        Ok(SeedResult { tables })
    }

    /// Checks the seeded rows against the expected counts.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, SeedError> {
        let mut checks = Vec::with_capacity(SEED_CONTRACT.len());
        for check in SEED_CONTRACT {
            let actual: i64 = sqlx::query_scalar(check.query).fetch_one(pool).await?;
            checks.push((check.label, actual == check.expected));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every row from the seeded tables, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), SeedError> {
        let mut tx = pool.begin().await?;
        for table in SEED_TABLES {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tables: Vec<TableSeedInfo>,
}

#[derive(Debug)]
pub struct TableSeedInfo {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
