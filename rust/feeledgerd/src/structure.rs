use crate::error::{FeeError, FeeResult};
use crate::model::{FeeFrequency, FeeStructure, FeeType, FEE_STRUCTURE_COLUMNS};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureWithType {
    #[serde(flatten)]
    pub structure: FeeStructure,
    pub fee_type: FeeType,
}

/// All fee structures for a class in an academic year, joined with their fee type.
///
/// Duplicate structures for the same fee type are returned in creation order.
pub fn structures_for_class(
    conn: &Connection,
    class_id: &str,
    academic_year_id: &str,
) -> FeeResult<Vec<StructureWithType>> {
    let sql = format!(
        "SELECT {}, ft.name, ft.frequency
         FROM fee_structures fs
         JOIN fee_types ft ON ft.id = fs.fee_type_id
         WHERE fs.class_id = ? AND fs.academic_year_id = ?
         ORDER BY fs.created_at, fs.rowid",
        FEE_STRUCTURE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, academic_year_id), |r| {
            let structure = FeeStructure::from_row(r)?;
            let raw_frequency: String = r.get(9)?;
            let frequency = FeeFrequency::from_str(&raw_frequency).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
            })?;
            Ok(StructureWithType {
                fee_type: FeeType {
                    id: structure.fee_type_id.clone(),
                    name: r.get(8)?,
                    frequency,
                },
                structure,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The policy that governs a fee record, if one can be determined.
pub fn structure_for(
    conn: &Connection,
    fee_type_id: &str,
    class_id: &str,
    academic_year_id: &str,
) -> FeeResult<Option<FeeStructure>> {
    let sql = format!(
        "SELECT {}
         FROM fee_structures fs
         WHERE fs.fee_type_id = ? AND fs.class_id = ? AND fs.academic_year_id = ?
         ORDER BY fs.created_at, fs.rowid
         LIMIT 1",
        FEE_STRUCTURE_COLUMNS
    );
    conn.query_row(
        &sql,
        (fee_type_id, class_id, academic_year_id),
        FeeStructure::from_row,
    )
    .optional()
    .map_err(FeeError::from)
}
