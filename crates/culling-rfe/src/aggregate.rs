//! Collapse design-column importances to one value per original predictor.

use crate::design::DesignLayout;
use crate::error::RfeError;

/// A named importance score.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureImportance {
    /// Design column or predictor name.
    pub feature: String,
    /// Importance score; larger is more important.
    pub importance: f64,
}

/// Sum design-column importances into their source predictors.
///
/// Numeric columns pass through and the indicator columns of a categorical
/// predictor are summed. The result lists every predictor of `layout` in
/// schema order; a predictor none of whose columns appears in
/// `importances` scores 0.
///
/// # Errors
///
/// Returns [`RfeError::UnknownFeature`] if an entry names a column that is
/// not part of `layout`.
pub fn aggregate(
    importances: &[FeatureImportance],
    layout: &DesignLayout,
) -> Result<Vec<FeatureImportance>, RfeError> {
    let mut totals = vec![0.0f64; layout.predictor_names().len()];
    for entry in importances {
        let col = layout
            .position(&entry.feature)
            .ok_or_else(|| RfeError::UnknownFeature {
                name: entry.feature.clone(),
            })?;
        totals[layout.columns()[col].predictor] += entry.importance;
    }
    Ok(layout
        .predictor_names()
        .iter()
        .zip(totals)
        .map(|(name, importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect())
}
