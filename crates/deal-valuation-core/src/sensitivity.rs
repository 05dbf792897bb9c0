use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::SensitivityAxis;
use crate::ValuationResult;

/// A two-way sensitivity grid. `matrix[i][j]` holds the metric at
/// `row_values[i]` x `col_values[j]`. Cells where the model rejected the
/// input combination are `None`; each rejection is reported alongside the
/// grid, never filled with a placeholder value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub row_axis: String,
    pub col_axis: String,
    pub row_values: Vec<Decimal>,
    pub col_values: Vec<Decimal>,
    pub metric: String,
    pub matrix: Vec<Vec<Option<Decimal>>>,
}

/// Expand an axis into `steps` evenly spaced values from min to max inclusive.
pub fn axis_values(axis: &SensitivityAxis) -> ValuationResult<Vec<Decimal>> {
    if axis.steps < 2 {
        return Err(ValuationError::InvalidInput {
            field: format!("axis:{}", axis.name),
            reason: "At least 2 steps are required".into(),
        });
    }
    if axis.min >= axis.max {
        return Err(ValuationError::InvalidInput {
            field: format!("axis:{}", axis.name),
            reason: "Axis min must be below max".into(),
        });
    }

    let step = (axis.max - axis.min) / Decimal::from(axis.steps - 1);
    let mut values = Vec::with_capacity(axis.steps as usize);
    for i in 0..axis.steps {
        values.push(axis.min + step * Decimal::from(i));
    }
    // Pin the endpoint exactly; step arithmetic can drift in the last digit.
    values[(axis.steps - 1) as usize] = axis.max;
    Ok(values)
}

/// Evaluate a two-way grid using the provided model function. The function
/// receives (row_value, col_value); an `Err` leaves the cell empty and adds
/// a warning.
pub fn evaluate_grid<F>(
    row_axis: &SensitivityAxis,
    col_axis: &SensitivityAxis,
    metric: &str,
    eval_fn: F,
) -> ValuationResult<(SensitivityGrid, Vec<String>)>
where
    F: Fn(Decimal, Decimal) -> ValuationResult<Decimal>,
{
    let row_values = axis_values(row_axis)?;
    let col_values = axis_values(col_axis)?;
    let mut warnings: Vec<String> = Vec::new();

    let mut matrix = Vec::with_capacity(row_values.len());
    for r in &row_values {
        let mut row = Vec::with_capacity(col_values.len());
        for c in &col_values {
            match eval_fn(*r, *c) {
                Ok(val) => row.push(Some(val)),
                Err(e) => {
                    warnings.push(format!(
                        "{} = {r}, {} = {c}: {e}",
                        row_axis.name, col_axis.name
                    ));
                    row.push(None);
                }
            }
        }
        matrix.push(row);
    }

    if matrix.iter().flatten().all(|cell| cell.is_none()) {
        return Err(ValuationError::insufficient(format!(
            "Every cell of the {metric} sensitivity grid was rejected by the model"
        )));
    }

    Ok((
        SensitivityGrid {
            row_axis: row_axis.name.clone(),
            col_axis: col_axis.name.clone(),
            row_values,
            col_values,
            metric: metric.to_string(),
            matrix,
        },
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn axis(name: &str, min: Decimal, max: Decimal, steps: u32) -> SensitivityAxis {
        SensitivityAxis {
            name: name.into(),
            min,
            max,
            steps,
        }
    }

    #[test]
    fn test_axis_values_even_spacing() {
        let vals = axis_values(&axis("WACC", dec!(0.08), dec!(0.12), 5)).unwrap();
        assert_eq!(
            vals,
            vec![dec!(0.08), dec!(0.09), dec!(0.10), dec!(0.11), dec!(0.12)]
        );
    }

    #[test]
    fn test_axis_endpoint_pinned() {
        let vals = axis_values(&axis("g", dec!(0), dec!(1), 4)).unwrap();
        assert_eq!(vals.len(), 4);
        assert_eq!(*vals.last().unwrap(), dec!(1));
    }

    #[test]
    fn test_axis_rejects_single_step() {
        assert!(axis_values(&axis("x", dec!(0), dec!(1), 1)).is_err());
    }

    #[test]
    fn test_axis_rejects_inverted_range() {
        assert!(axis_values(&axis("x", dec!(1), dec!(0), 3)).is_err());
    }

    #[test]
    fn test_grid_monotonicity() {
        // Model: 1000 / (r - g), decreasing in r, increasing in g
        let (grid, warnings) = evaluate_grid(
            &axis("Discount Rate", dec!(0.08), dec!(0.12), 5),
            &axis("Terminal Growth", dec!(0.01), dec!(0.05), 5),
            "Enterprise Value",
            |r, g| {
                let spread = r - g;
                if spread <= Decimal::ZERO {
                    return Err(ValuationError::InvalidInput {
                        field: "spread".into(),
                        reason: "rate must exceed growth".into(),
                    });
                }
                Ok(dec!(1000) / spread)
            },
        )
        .unwrap();

        assert!(warnings.is_empty());
        // Down a column: higher discount rate, lower value
        for j in 0..grid.col_values.len() {
            for i in 0..grid.row_values.len() - 1 {
                assert!(grid.matrix[i][j].unwrap() > grid.matrix[i + 1][j].unwrap());
            }
        }
        // Across a row: higher growth, higher value
        for i in 0..grid.row_values.len() {
            for j in 0..grid.col_values.len() - 1 {
                assert!(grid.matrix[i][j].unwrap() < grid.matrix[i][j + 1].unwrap());
            }
        }
    }

    #[test]
    fn test_grid_invalid_cells_are_none() {
        let (grid, warnings) = evaluate_grid(
            &axis("r", dec!(0.01), dec!(0.05), 5),
            &axis("g", dec!(0.01), dec!(0.05), 5),
            "Value",
            |r, g| {
                if r <= g {
                    return Err(ValuationError::InvalidInput {
                        field: "r".into(),
                        reason: "r must exceed g".into(),
                    });
                }
                Ok(r - g)
            },
        )
        .unwrap();

        // The diagonal and upper triangle are invalid
        assert!(grid.matrix[0][0].is_none());
        assert!(grid.matrix[4][0].is_some());
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_grid_all_invalid_is_error() {
        let result = evaluate_grid(
            &axis("a", dec!(0), dec!(1), 3),
            &axis("b", dec!(0), dec!(1), 3),
            "Value",
            |_, _| {
                Err(ValuationError::InvalidInput {
                    field: "a".into(),
                    reason: "always rejected".into(),
                })
            },
        );
        assert!(result.is_err());
    }
}
