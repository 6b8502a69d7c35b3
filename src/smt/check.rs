//! Small-scope model finding.
//!
//! Formulas produced for a single value mention only a handful of narrow variables (the
//! 2-bit input selector, symbolic type widths), so exhaustively enumerating their assignments
//! is enough to decide them. Anything wider is refused rather than silently approximated.

use log::debug;
use num_bigint::BigUint;

use crate::error::CheckError;
use crate::smt::{mask, Expr, Model, Smt};

/// Largest combined width of free variables that [`Smt::find_model`] will enumerate.
pub const MAX_ENUM_BITS: u32 = 20;

impl Smt {
    /// Returns an assignment satisfying `e`, or `None` if `e` is unsatisfiable.
    pub fn find_model(&self, e: Expr) -> Result<Option<Model>, CheckError> {
        assert!(self.sort(e).is_bool(), "find_model: expected a boolean formula");

        let vars = self.declarations(e);
        let bits: u32 = vars.iter().map(|(_, sort)| sort.width()).sum();
        if bits > MAX_ENUM_BITS {
            return Err(CheckError::TooManyBits {
                bits,
                limit: MAX_ENUM_BITS,
            });
        }
        debug!("find_model: {} variables, {} bits", vars.len(), bits);

        for assignment in 0u64..(1u64 << bits) {
            let mut model = Model::new();
            let mut rest = BigUint::from(assignment);
            for (name, sort) in vars.iter() {
                let w = sort.width();
                model.set(name.clone(), rest.clone() & mask(w));
                rest >>= w;
            }
            if self.eval_bool(e, &model) == Some(true) {
                debug!("find_model: found {}", model);
                return Ok(Some(model));
            }
        }
        Ok(None)
    }

    pub fn is_sat(&self, e: Expr) -> Result<bool, CheckError> {
        Ok(self.find_model(e)?.is_some())
    }

    /// Checks that `e` holds under every assignment.
    pub fn is_valid(&self, e: Expr) -> Result<bool, CheckError> {
        let negated = self.mk_not(e);
        Ok(self.find_model(negated)?.is_none())
    }

    /// Checks that `hyp` implies `concl` under every assignment.
    pub fn is_implied(&self, hyp: Expr, concl: Expr) -> Result<bool, CheckError> {
        let f = self.mk_implies(hyp, concl);
        self.is_valid(f)
    }
}
