//! Formula storage port trait.

use crate::domain::error::CalcError;
use crate::domain::expression::Formula;

pub trait FormulaPort {
    /// Fetch a formula by id. Implementations return only validated formulas.
    fn fetch_formula(&self, formula_id: &str) -> Result<Formula, CalcError>;

    fn store_formula(&self, formula: &Formula) -> Result<(), CalcError>;

    fn list_formulas(&self) -> Result<Vec<String>, CalcError>;
}
