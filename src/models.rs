//! Modelos de dominio: registros de entrada, chunks y resultados de búsqueda.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph_store::Value;

/// Valor escalar semiestructurado de la fuente (pesos y flags de forma).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Un flag de forma está presente sólo cuando vale exactamente 1.
    pub fn is_one(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i == 1,
            Scalar::Float(f) => *f == 1.0,
            Scalar::Text(s) => s.trim() == "1",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&Scalar> for Value {
    fn from(s: &Scalar) -> Self {
        match s {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Int(*i),
            Scalar::Float(x) => Value::Float(*x),
            Scalar::Text(t) => Value::Text(t.clone()),
        }
    }
}

/// Un registro de medicamento tal como llega en el fichero JSON.
/// Todos los campos son opcionales; los ausentes o `null` se tratan como vacíos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    #[serde(rename = "Medicine Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Generics indicated", default)]
    pub generic: Option<String>,
    #[serde(rename = "Therapeutic Class", default)]
    pub therapeutic_class: Option<String>,
    #[serde(rename = "Indications", default)]
    pub indications: Option<String>,
    #[serde(rename = "Indications Details", default)]
    pub indication_details: Option<String>,
    #[serde(rename = "Weight (mg)", default)]
    pub weight_mg: Option<Scalar>,
    #[serde(rename = "Weight (ml/other)", default)]
    pub weight_other: Option<Scalar>,
    #[serde(rename = "Tablet", default)]
    pub tablet: Option<Scalar>,
    #[serde(rename = "Syrup", default)]
    pub syrup: Option<Scalar>,
    #[serde(rename = "Ointment", default)]
    pub ointment: Option<Scalar>,
    #[serde(rename = "Drop", default)]
    pub drop: Option<Scalar>,
    #[serde(rename = "Injection", default)]
    pub injection: Option<Scalar>,
    #[serde(rename = "Manufacturer", default)]
    pub manufacturer: Option<String>,
}

impl MedicineRecord {
    /// Nombre del medicamento, si no está vacío. Es la identidad del nodo :Medicine.
    pub fn medicine_name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn manufacturer_name(&self) -> Option<&str> {
        non_empty(&self.manufacturer)
    }

    pub fn generic_name(&self) -> Option<&str> {
        non_empty(&self.generic)
    }

    pub fn class_name(&self) -> Option<&str> {
        non_empty(&self.therapeutic_class)
    }

    /// Indicación principal, recortada.
    pub fn primary_indication(&self) -> Option<&str> {
        self.indications
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn forms(&self) -> DosageForms {
        let flag = |v: &Option<Scalar>| v.as_ref().map(Scalar::is_one).unwrap_or(false);
        DosageForms {
            tablet: flag(&self.tablet),
            syrup: flag(&self.syrup),
            ointment: flag(&self.ointment),
            drop: flag(&self.drop),
            injection: flag(&self.injection),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// Formas farmacéuticas disponibles de un medicamento.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DosageForms {
    pub tablet: bool,
    pub syrup: bool,
    pub ointment: bool,
    pub drop: bool,
    pub injection: bool,
}

impl DosageForms {
    /// Nombres de las formas presentes, en orden fijo.
    pub fn available(&self) -> Vec<&'static str> {
        [
            (self.tablet, "Tablet"),
            (self.syrup, "Syrup"),
            (self.ointment, "Ointment"),
            (self.drop, "Drop"),
            (self.injection, "Injection"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect()
    }
}

/// Trozo del texto serializado de un registro, listo para embeber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChunk {
    pub chunk_id: String,
    pub seq: usize,
    pub text: String,
    /// Nombre del medicamento propietario (`medicine_name_ref`).
    pub medicine_name_ref: String,
    pub source: String,
    /// Offset (en caracteres) del chunk dentro del texto serializado.
    pub start: usize,
    /// Caracteres compartidos con el chunk anterior.
    pub overlap: usize,
}

impl RecordChunk {
    /// Selector por defecto del campo propietario.
    pub fn owner_name(&self) -> &str {
        &self.medicine_name_ref
    }
}

/// Un resultado de la búsqueda vectorial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
}
