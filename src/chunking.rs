//! Serialización de registros y división en chunks solapados.
//!
//! El divisor busca fronteras por prioridad (párrafo, línea, frase, espacio)
//! y cae a un corte duro sólo cuando no hay frontera. Los chunks son trozos
//! exactos del texto: concatenándolos sin el solapamiento declarado se
//! reconstruye el original carácter a carácter.

use std::collections::VecDeque;
use std::ops::Range;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::models::{MedicineRecord, RecordChunk, Scalar};

pub const DEFAULT_CHUNK_SIZE: usize = 600;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const CHUNK_SOURCE: &str = "medicine_database";
pub const UNKNOWN_MEDICINE: &str = "UnknownMedicine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
}

impl Boundary {
    const ORDER: [Boundary; 4] = [
        Boundary::Paragraph,
        Boundary::Line,
        Boundary::Sentence,
        Boundary::Whitespace,
    ];

    fn separators(self) -> &'static [&'static str] {
        match self {
            Boundary::Paragraph => &["\n\n"],
            Boundary::Line => &["\n"],
            Boundary::Sentence => &[". ", "? ", "! "],
            Boundary::Whitespace => &[" ", "\t"],
        }
    }
}

/// Trozo de texto producido por el divisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    /// Offset en caracteres dentro del texto original.
    pub start: usize,
    /// Caracteres compartidos con el trozo anterior.
    pub overlap: usize,
}

/// Divisor recursivo por fronteras estructurales. Tamaños en caracteres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("El tamaño de chunk debe ser mayor que 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "El solapamiento ({chunk_overlap}) debe ser menor que el tamaño de chunk ({chunk_size})"
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Divide `text`. Un texto vacío o de longitud <= chunk_size produce un único trozo.
    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![TextSpan {
                text: text.to_string(),
                start: 0,
                overlap: 0,
            }];
        }

        let mut pieces = Vec::new();
        self.collect_pieces(&chars, 0..chars.len(), 0, &mut pieces);

        let mut spans: Vec<TextSpan> = Vec::new();
        let mut prev_end: usize = 0;
        for range in self.merge(&pieces) {
            let overlap = if spans.is_empty() {
                0
            } else {
                prev_end.saturating_sub(range.start)
            };
            prev_end = range.end;
            spans.push(TextSpan {
                text: chars[range.clone()].iter().collect(),
                start: range.start,
                overlap,
            });
        }
        spans
    }

    /// Descompone `range` en piezas contiguas de como mucho `chunk_size`.
    fn collect_pieces(
        &self,
        chars: &[char],
        range: Range<usize>,
        level: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        if range.len() <= self.chunk_size {
            if !range.is_empty() {
                out.push(range);
            }
            return;
        }

        match Boundary::ORDER.get(level) {
            Some(boundary) => {
                let parts = split_after(chars, range.clone(), boundary.separators());
                if parts.len() == 1 {
                    self.collect_pieces(chars, range, level + 1, out);
                } else {
                    for part in parts {
                        self.collect_pieces(chars, part, level + 1, out);
                    }
                }
            }
            None => {
                // Cortes duros en trozos de como mucho `chunk_overlap`, para que
                // `merge` pueda arrastrar solapamiento también en texto sin huecos.
                let step = if self.chunk_overlap == 0 {
                    self.chunk_size
                } else {
                    self.chunk_overlap.min(self.chunk_size - self.chunk_overlap)
                };
                let mut start = range.start;
                while start < range.end {
                    let end = (start + step).min(range.end);
                    out.push(start..end);
                    start = end;
                }
            }
        }
    }

    /// Agrupa piezas consecutivas en chunks, arrastrando como solapamiento las
    /// últimas piezas del chunk anterior que quepan en `chunk_overlap`.
    fn merge(&self, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<Range<usize>> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = piece.len();
            if total + len > self.chunk_size && !window.is_empty() {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    chunks.push(first.start..last.end);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.len(),
                        None => break,
                    }
                }
            }
            window.push_back(piece.clone());
            total += len;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            chunks.push(first.start..last.end);
        }
        chunks
    }
}

/// Parte `range` justo después de cada separador (el separador queda a la izquierda).
fn split_after(chars: &[char], range: Range<usize>, separators: &[&str]) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut start = range.start;
    let mut i = range.start;
    while i < range.end {
        match separators
            .iter()
            .find_map(|sep| separator_len_at(chars, i, range.end, sep))
        {
            Some(len) => {
                i += len;
                parts.push(start..i);
                start = i;
            }
            None => i += 1,
        }
    }
    if start < range.end {
        parts.push(start..range.end);
    }
    parts
}

fn separator_len_at(chars: &[char], at: usize, end: usize, separator: &str) -> Option<usize> {
    let len = separator.chars().count();
    if at + len > end {
        return None;
    }
    separator
        .chars()
        .zip(&chars[at..at + len])
        .all(|(a, b)| a == *b)
        .then_some(len)
}

/// Texto canónico de un registro, con los campos en orden fijo.
pub fn serialize_record(record: &MedicineRecord) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    let scalar = |v: &Option<Scalar>| v.as_ref().map(|s| s.to_string()).unwrap_or_default();
    let forms = record.forms().available();
    let forms = if forms.is_empty() {
        "N/A".to_string()
    } else {
        forms.join(", ")
    };

    let mut text = String::new();
    text.push_str(&format!(
        "Medicine Name: {}\n",
        record.name.as_deref().unwrap_or(UNKNOWN_MEDICINE)
    ));
    text.push_str(&format!("Generics indicated: {}\n", field(&record.generic)));
    text.push_str(&format!("Therapeutic Class: {}\n", field(&record.therapeutic_class)));
    text.push_str(&format!("Indications: {}\n", field(&record.indications)));
    text.push_str(&format!(
        "Indications Details: {}\n",
        field(&record.indication_details)
    ));
    text.push_str(&format!("Weight (mg): {}\n", scalar(&record.weight_mg)));
    text.push_str(&format!("Weight (ml/other): {}\n", scalar(&record.weight_other)));
    text.push_str(&format!("Available Forms: {forms}\n"));
    text.push_str(&format!("Manufacturer: {}", field(&record.manufacturer)));
    text
}

pub fn slugify(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

/// `medicine-{slug}-chunk{seq:04}`
pub fn chunk_id(medicine_name: &str, seq: usize) -> String {
    format!("medicine-{}-chunk{:04}", slugify(medicine_name), seq)
}

/// Chunks de un registro, con secuencia contigua desde 0.
pub fn chunk_record(record: &MedicineRecord, splitter: &TextSplitter) -> Vec<RecordChunk> {
    let owner = record
        .name
        .clone()
        .unwrap_or_else(|| UNKNOWN_MEDICINE.to_string());
    let text = serialize_record(record);

    let chunks: Vec<RecordChunk> = splitter
        .split(&text)
        .into_iter()
        .enumerate()
        .map(|(seq, span)| RecordChunk {
            chunk_id: chunk_id(&owner, seq),
            seq,
            text: span.text,
            medicine_name_ref: owner.clone(),
            source: CHUNK_SOURCE.to_string(),
            start: span.start,
            overlap: span.overlap,
        })
        .collect();

    debug!(medicine = %owner, chunks = chunks.len(), "Registro dividido en chunks");
    chunks
}

/// Reconstruye el texto original a partir de trozos consecutivos.
pub fn reassemble<'a>(spans: impl IntoIterator<Item = (&'a str, usize)>) -> String {
    let mut out = String::new();
    for (text, overlap) in spans {
        out.extend(text.chars().skip(overlap));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariants(splitter: &TextSplitter, text: &str) {
        let spans = splitter.split(text);
        assert!(!spans.is_empty());
        assert_eq!(spans[0].start, 0);
        for pair in spans.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].overlap <= splitter.chunk_overlap());
        }
        for span in &spans {
            assert!(span.text.chars().count() <= splitter.chunk_size());
        }
        let rebuilt = reassemble(spans.iter().map(|s| (s.text.as_str(), s.overlap)));
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = TextSplitter::default();
        let spans = splitter.split("Medicine Name: Abdorin");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Medicine Name: Abdorin");

        let empty = splitter.split("");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].text, "");
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let text = "first paragraph here\n\nsecond paragraph here";
        let spans = splitter.split(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "first paragraph here\n\n");
        assert_eq!(spans[1].text, "second paragraph here");
    }

    #[test]
    fn overlapping_chunks_cover_the_text() {
        let splitter = TextSplitter::new(60, 20).unwrap();
        let text = "Indications: acid peptic disorders. Heartburn relief. \
                    Gastric ulcer prevention and treatment.\nDetails: take one \
                    tablet after meals, twice daily, unless directed otherwise.";
        check_invariants(&splitter, text);
        assert!(splitter.split(text).iter().skip(1).any(|s| s.overlap > 0));
    }

    #[test]
    fn hard_cut_when_there_is_no_boundary() {
        let splitter = TextSplitter::new(10, 3).unwrap();
        let text = "x".repeat(35);
        check_invariants(&splitter, &text);
    }

    #[test]
    fn hard_cuts_keep_the_configured_overlap() {
        let splitter = TextSplitter::new(10, 3).unwrap();
        let spans = splitter.split(&"x".repeat(35));
        assert!(spans.len() > 1);
        assert!(spans.iter().skip(1).all(|s| s.overlap == 3));

        let spans = TextSplitter::default().split(&"y".repeat(1500));
        let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 400, 800, 1200]);
        assert!(spans.iter().skip(1).all(|s| s.overlap == DEFAULT_CHUNK_OVERLAP));
        assert!(spans.iter().all(|s| s.text.chars().count() <= DEFAULT_CHUNK_SIZE));
    }

    #[test]
    fn handles_multibyte_text() {
        let splitter = TextSplitter::new(12, 4).unwrap();
        check_invariants(&splitter, "acidez gástrica — úlcera péptica, náuseas y ardor");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }

    #[test]
    fn serializes_fields_in_fixed_order() {
        let record = MedicineRecord {
            name: Some("Abdorin".into()),
            therapeutic_class: Some("Antacid".into()),
            indications: Some("Acidity".into()),
            weight_mg: Some(Scalar::Int(500)),
            tablet: Some(Scalar::Int(1)),
            syrup: Some(Scalar::Int(1)),
            manufacturer: Some("AcmeCo".into()),
            ..Default::default()
        };
        let text = serialize_record(&record);
        assert_eq!(
            text,
            "Medicine Name: Abdorin\n\
             Generics indicated: \n\
             Therapeutic Class: Antacid\n\
             Indications: Acidity\n\
             Indications Details: \n\
             Weight (mg): 500\n\
             Weight (ml/other): \n\
             Available Forms: Tablet, Syrup\n\
             Manufacturer: AcmeCo"
        );
    }

    #[test]
    fn chunk_ids_are_stable_and_contiguous() {
        let record = MedicineRecord {
            name: Some("Napa Extra".into()),
            indication_details: Some("Fever and pain relief. ".repeat(60)),
            ..Default::default()
        };
        let chunks = chunk_record(&record, &TextSplitter::default());
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.seq, i);
            assert_eq!(chunk.chunk_id, format!("medicine-napa_extra-chunk{i:04}"));
            assert_eq!(chunk.medicine_name_ref, "Napa Extra");
            assert_eq!(chunk.source, CHUNK_SOURCE);
        }
        let rebuilt = reassemble(chunks.iter().map(|c| (c.text.as_str(), c.overlap)));
        assert_eq!(rebuilt, serialize_record(&record));
    }

    #[test]
    fn unnamed_records_use_placeholder_owner() {
        let chunks = chunk_record(&MedicineRecord::default(), &TextSplitter::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].medicine_name_ref, UNKNOWN_MEDICINE);
        assert_eq!(chunks[0].chunk_id, "medicine-unknownmedicine-chunk0000");
    }
}
