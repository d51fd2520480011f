//! Export readiness: guarantees a draft order is well-formed and fully
//! matched before the ERP transport (outside this crate) picks it up.

use crate::db::order_repo::{DraftLineRow, DraftOrderRow};
use crate::error::ExportError;
use crate::model::{ExportStatus, MatchStatus};

/// Checks that a draft order may be handed to the export transport.
///
/// Exportable iff there is at least one line and every line is matched or
/// overridden with a resolved internal SKU and a positive quantity. All
/// failing lines are reported, not just the first.
pub fn check_ready(order: &DraftOrderRow, lines: &[DraftLineRow]) -> Result<(), ExportError> {
    let mut problems = Vec::new();

    if lines.is_empty() {
        problems.push("order has no lines".to_string());
    }

    for line in lines {
        let status = MatchStatus::parse(&line.match_status);
        let resolved = matches!(
            status,
            Some(MatchStatus::Matched) | Some(MatchStatus::Overridden)
        );
        if !resolved {
            problems.push(format!(
                "line {} is {}",
                line.line_number,
                status.map(|s| s.as_str()).unwrap_or("in an unknown state")
            ));
            continue;
        }
        if line.internal_sku.as_deref().map(str::trim).unwrap_or("").is_empty() {
            problems.push(format!("line {} has no internal SKU", line.line_number));
        }
        if line.quantity <= 0.0 {
            problems.push(format!(
                "line {} has non-positive quantity {}",
                line.line_number, line.quantity
            ));
        }
    }

    if problems.is_empty() {
        tracing::debug!(order = %order.id, lines = lines.len(), "order ready for export");
        Ok(())
    } else {
        Err(ExportError::NotReady { problems })
    }
}

/// Validates an export status move without touching storage; repos use
/// the same rule when persisting.
pub fn check_transition(from: ExportStatus, to: ExportStatus) -> Result<(), ExportError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(ExportError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}
