//! Construcción del grafo estructurado de medicamentos:
//! Manufacturer → Medicine → Generic / TherapeuticClass / Indication.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::graph_store::{GraphStore, StoreError};
use crate::models::MedicineRecord;
use crate::statements;

/// Resultado de procesar un registro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Built { name: String },
    Skipped { position: usize },
    Failed { name: String, error: String },
}

/// Resumen de una pasada del constructor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphBuildReport {
    pub built: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Upsert de todos los registros. Un registro sin nombre se omite y un error
/// de almacén en un registro no detiene el resto. Idempotente.
pub async fn build_structured_graph(
    store: &dyn GraphStore,
    records: &[MedicineRecord],
) -> GraphBuildReport {
    let mut report = GraphBuildReport::default();
    for (position, record) in records.iter().enumerate() {
        match upsert_record(store, position, record).await {
            RecordOutcome::Built { name } => {
                debug!(medicine = %name, "Grafo estructurado creado");
                report.built += 1;
            }
            RecordOutcome::Skipped { position } => {
                warn!(position, "Registro omitido: falta 'Medicine Name'");
                report.skipped += 1;
            }
            RecordOutcome::Failed { name, error } => {
                error!(medicine = %name, "Error creando el grafo estructurado: {error}");
                report.failed += 1;
            }
        }
    }
    report
}

/// Upserts de un registro, en orden de dependencia: el :Manufacturer antes
/// que el :Medicine que lo enlaza, y el :Medicine antes que el resto.
pub async fn upsert_record(
    store: &dyn GraphStore,
    position: usize,
    record: &MedicineRecord,
) -> RecordOutcome {
    let Some(name) = record.medicine_name() else {
        return RecordOutcome::Skipped { position };
    };
    match run_upserts(store, name, record).await {
        Ok(()) => RecordOutcome::Built {
            name: name.to_string(),
        },
        Err(e) => RecordOutcome::Failed {
            name: name.to_string(),
            error: e.to_string(),
        },
    }
}

async fn run_upserts(
    store: &dyn GraphStore,
    name: &str,
    record: &MedicineRecord,
) -> Result<(), StoreError> {
    // 1) Manufacturer
    if let Some(manufacturer) = record.manufacturer_name() {
        store.run(statements::merge_manufacturer(manufacturer)).await?;
    }

    // 2) Medicine (+ PRODUCES)
    store.run(statements::merge_medicine(name, record)).await?;

    // 3) Generic
    if let Some(generic) = record.generic_name() {
        store.run(statements::merge_generic(name, generic)).await?;
    }

    // 4) TherapeuticClass
    if let Some(class) = record.class_name() {
        store
            .run(statements::merge_therapeutic_class(name, class))
            .await?;
    }

    // 5) Indication
    if let Some(indication) = record.primary_indication() {
        let details = record.indication_details.as_deref().unwrap_or_default();
        store
            .run(statements::merge_indication(name, indication, details))
            .await?;
    }

    Ok(())
}
