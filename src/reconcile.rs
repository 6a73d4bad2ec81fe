//! UN numeric to ISO3 relabelling.
//!
//! Several UN codes can map to one ISO3 code when a country split or merged
//! (former Germanies, Vietnams, Yemens). Their rows and then their columns
//! are summed into a single label. This cannot disaggregate a pre-split
//! value and is kept as an explicit approximation.

use std::collections::HashMap;

use crate::domain::CountryCode;
use crate::error::MatrixError;
use crate::matrix::TradeMatrix;

/// Relabel a UN-labelled matrix to ISO3 and merge duplicate labels by summation.
///
/// Labels keep the order of their first occurrence. An unknown UN code or a
/// duplicate label surviving the merge is a fatal `Reconciliation` error.
pub fn reconcile(
    matrix: &TradeMatrix,
    crosswalk: &[CountryCode],
) -> Result<TradeMatrix, MatrixError> {
    let iso3_by_un = crosswalk
        .iter()
        .map(|country| (country.un_id.as_str(), country.iso3.as_str()))
        .collect::<HashMap<_, _>>();

    let mut labels: Vec<String> = Vec::new();
    let mut target = Vec::with_capacity(matrix.size());
    for un_id in matrix.labels() {
        let iso3 = iso3_by_un.get(un_id.as_str()).ok_or_else(|| {
            MatrixError::Reconciliation(format!("UN code {un_id} is missing from the crosswalk"))
        })?;
        let idx = match labels.iter().position(|label| label == iso3) {
            Some(idx) => idx,
            None => {
                labels.push(iso3.to_string());
                labels.len() - 1
            }
        };
        target.push(idx);
    }

    // Group rows, then columns; same result as transpose/group/sum/transpose.
    let mut reconciled = TradeMatrix::zeros(labels);
    for (row, &to_row) in target.iter().enumerate() {
        for (col, &to_col) in target.iter().enumerate() {
            reconciled.add(to_row, to_col, matrix.value(row, col));
        }
    }

    if reconciled.has_duplicate_labels() {
        return Err(MatrixError::Reconciliation(
            "duplicate ISO3 labels remain after merge".to_string(),
        ));
    }
    Ok(reconciled)
}
