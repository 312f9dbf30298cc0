//! Taylor decomposition of ODE systems.
//!
//! A system of symbolic right-hand sides is flattened into an ordered list
//! of `u` variables: the state variables first, then a sequence of
//! elementary operations whose operands are earlier `u` variables (or
//! literals), then one entry per equation giving the decomposed right-hand
//! side. Common subexpressions in the middle region are eliminated.
//!
//! Functions with hidden dependencies emit their companions here: `sin`
//! and `cos` are always generated as a pair, and `erf` emits the
//! `square → negate → exp` chain its recurrence reads from.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};

use crate::error::Error;
#[cfg(debug_assertions)]
use crate::expr::subs;
use crate::expr::{cos, erf, exp, rename_variables, sin, square, variables};
use crate::expr::{Expression, Func};

/// Internal name of the `i`-th `u` variable.
pub(crate) fn u_name(i: usize) -> String {
    format!("u_{}", i)
}

/// Parse the index out of a `u_i` variable name.
pub(crate) fn uname_to_index(name: &str) -> Option<u32> {
    name.strip_prefix("u_")?.parse().ok()
}

/// A Taylor decomposition of an ODE system.
///
/// The entry list is laid out as: `n_eq` state variables, the elementary
/// operations, and finally `n_eq` entries holding the decomposed
/// right-hand side of each equation (a literal or a `u_j` variable).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Decomposition {
    entries: Vec<Expression>,
    n_eq: usize,
}

impl Decomposition {
    /// All `u` variable definitions, in order.
    pub fn entries(&self) -> &[Expression] {
        &self.entries
    }

    /// Number of equations (and state variables) in the system.
    pub fn n_eq(&self) -> usize {
        self.n_eq
    }

    /// Total number of `u` variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the decomposition is empty (never true for a valid one).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for Decomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "u_{} = {}", i, entry)?;
        }
        Ok(())
    }
}

/// Decompose `ex`, appending new `u` variable definitions to `defs`.
///
/// Returns the index of the definition representing `ex`, or 0 when `ex`
/// was left in place (literals, parameters and plain variables).
fn decompose_in_place(ex: Expression, defs: &mut Vec<Expression>) -> Result<usize, Error> {
    match ex {
        Expression::Num(_) | Expression::Var(_) | Expression::Par(_) => Ok(0),
        Expression::Binary(op, lhs, rhs) => {
            let mut lhs = *lhs;
            let mut rhs = *rhs;
            if let idx @ 1.. = decompose_in_place(lhs.clone(), defs)? {
                lhs = Expression::Var(u_name(idx));
            }
            if let idx @ 1.. = decompose_in_place(rhs.clone(), defs)? {
                rhs = Expression::Var(u_name(idx));
            }
            defs.push(Expression::Binary(op, Box::new(lhs), Box::new(rhs)));
            Ok(defs.len() - 1)
        }
        Expression::Func(func, args) => {
            func.check_arity(&args)?;
            let mut args = args;
            for arg in &mut args {
                if let idx @ 1.. = decompose_in_place(arg.clone(), defs)? {
                    *arg = Expression::Var(u_name(idx));
                }
            }
            match func {
                // Sine and cosine need each other's jet to advance in
                // order, so both are always present, sine first.
                Func::Sin => {
                    let arg = args[0].clone();
                    defs.push(Expression::Func(Func::Sin, args));
                    let ret = defs.len() - 1;
                    defs.push(cos(arg));
                    Ok(ret)
                }
                Func::Cos => {
                    let arg = args[0].clone();
                    defs.push(sin(arg));
                    defs.push(Expression::Func(Func::Cos, args));
                    Ok(defs.len() - 1)
                }
                // The erf recurrence reads the jet of exp(-v²); emit the
                // chain computing it right before the erf entry itself.
                Func::Erf => {
                    let arg = args[0].clone();
                    defs.push(square(arg.clone()));
                    let sq = Expression::Var(u_name(defs.len() - 1));
                    defs.push(Expression::Num(-1.0) * sq);
                    let negated = Expression::Var(u_name(defs.len() - 1));
                    defs.push(exp(negated));
                    defs.push(erf(arg));
                    Ok(defs.len() - 1)
                }
                Func::Exp | Func::Log | Func::Pow | Func::Square | Func::Time => {
                    defs.push(Expression::Func(func, args));
                    Ok(defs.len() - 1)
                }
            }
        }
    }
}

/// Remove structurally equal duplicates from the middle region.
///
/// Walks the middle entries, renaming `u` variables through the running
/// rename map before comparison; the first occurrence of each expression
/// survives, duplicates extend the rename map. The tail is rewritten
/// through the final map.
fn decompose_cse(v_ex: Vec<Expression>, n_eq: usize) -> Vec<Expression> {
    debug_assert!(v_ex.len() >= n_eq * 2);

    let mut retval = Vec::with_capacity(v_ex.len());
    let mut ex_map: HashMap<Expression, usize> = HashMap::new();
    let mut uvars_rename: HashMap<String, String> = HashMap::new();

    let len = v_ex.len();
    let mut iter = v_ex.into_iter();

    // State variables pass through untouched.
    for _ in 0..n_eq {
        retval.push(iter.next().unwrap());
    }

    for i in n_eq..len - n_eq {
        let mut ex = iter.next().unwrap();
        rename_variables(&mut ex, &uvars_rename);

        if let Some(&canonical) = ex_map.get(&ex) {
            uvars_rename.insert(u_name(i), u_name(canonical));
        } else {
            retval.push(ex.clone());
            let new_idx = retval.len() - 1;
            ex_map.insert(ex, new_idx);
            uvars_rename.insert(u_name(i), u_name(new_idx));
        }
    }

    // The tail only needs its u variables remapped.
    for mut ex in iter {
        rename_variables(&mut ex, &uvars_rename);
        retval.push(ex);
    }

    retval
}

/// Verify a decomposition against the original right-hand sides by
/// recursive substitution. Debug builds only.
#[cfg(debug_assertions)]
fn verify_decomposition(orig: &[Expression], dc: &[Expression], n_eq: usize) {
    assert!(dc.len() >= n_eq * 2);

    // The first n_eq entries must be plain variables.
    for entry in &dc[..n_eq] {
        assert!(matches!(entry, Expression::Var(_)));
    }

    // Middle entries may reference only earlier u variables.
    for (i, entry) in dc.iter().enumerate().take(dc.len() - n_eq).skip(n_eq) {
        for name in variables(entry) {
            let idx = uname_to_index(&name).expect("non-u variable in the middle region");
            assert!((idx as usize) < i);
        }
    }

    // Tail entries are literals, parameters or earlier u variables.
    for (i, entry) in dc.iter().enumerate().skip(dc.len() - n_eq) {
        match entry {
            Expression::Num(_) | Expression::Par(_) => {}
            Expression::Var(name) => {
                let idx = uname_to_index(name).expect("non-u variable in the tail region");
                assert!((idx as usize) < i);
            }
            _ => panic!("tail entry is neither a literal nor a u variable"),
        }
    }

    // Expand every u variable definition and compare the tail against the
    // original right-hand sides.
    let mut subs_map: HashMap<String, Expression> = HashMap::new();
    for (i, entry) in dc.iter().enumerate().take(dc.len() - n_eq) {
        let expanded = subs(entry, &subs_map);
        subs_map.insert(u_name(i), expanded);
    }

    for (i, entry) in dc.iter().enumerate().skip(dc.len() - n_eq) {
        assert_eq!(subs(entry, &subs_map), orig[i - (dc.len() - n_eq)]);
    }
}

/// Shared tail of both decomposition entry points: rename, seed, decompose,
/// append, verify, CSE.
fn decompose_system(
    mut rhs: Vec<Expression>,
    state_vars: Vec<String>,
) -> Result<Decomposition, Error> {
    let n_eq = rhs.len();

    let repl_map: HashMap<String, String> = state_vars
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), u_name(i)))
        .collect();

    #[cfg(debug_assertions)]
    let orig_rhs = rhs.clone();

    for ex in &mut rhs {
        rename_variables(ex, &repl_map);
    }

    // Seed the definitions with the state variables themselves.
    let mut u_vars_defs: Vec<Expression> = state_vars.into_iter().map(Expression::Var).collect();

    // Decompose each equation; a decomposed right-hand side is replaced by
    // the u variable now representing it.
    let mut rhs_copy = rhs.clone();
    for (i, ex) in rhs.into_iter().enumerate() {
        if let idx @ 1.. = decompose_in_place(ex, &mut u_vars_defs)? {
            rhs_copy[i] = Expression::Var(u_name(idx));
        }
    }

    u_vars_defs.extend(rhs_copy);

    #[cfg(debug_assertions)]
    verify_decomposition(&orig_rhs, &u_vars_defs, n_eq);

    let entries = decompose_cse(u_vars_defs, n_eq);

    #[cfg(debug_assertions)]
    verify_decomposition(&orig_rhs, &entries, n_eq);

    Ok(Decomposition { entries, n_eq })
}

/// Decompose a system given as right-hand sides only.
///
/// The state variables are deduced from the expressions and must number
/// exactly as many as the equations; variables are assigned to equations
/// in alphabetical order of their names.
pub fn decompose(sys: &[Expression]) -> Result<Decomposition, Error> {
    if sys.is_empty() {
        return Err(Error::InvalidInput(
            "cannot decompose a system of zero equations".to_string(),
        ));
    }

    let mut vars: Vec<String> = Vec::new();
    for ex in sys {
        vars.extend(variables(ex));
    }
    vars.sort();
    vars.dedup();

    if vars.len() != sys.len() {
        return Err(Error::InvalidInput(format!(
            "the number of deduced variables for a Taylor decomposition ({}) differs from the number of equations ({})",
            vars.len(),
            sys.len()
        )));
    }

    decompose_system(sys.to_vec(), vars)
}

/// Decompose a system given as `(lhs, rhs)` pairs.
///
/// Every left-hand side must be a distinct plain variable and every
/// variable appearing on a right-hand side must also appear on some
/// left-hand side. State variables are ordered as declared.
pub fn decompose_pairs(sys: &[(Expression, Expression)]) -> Result<Decomposition, Error> {
    if sys.is_empty() {
        return Err(Error::InvalidInput(
            "cannot decompose a system of zero equations".to_string(),
        ));
    }

    let mut lhs_vars: Vec<String> = Vec::new();
    let mut lhs_set: HashSet<String> = HashSet::new();
    let mut rhs_set: HashSet<String> = HashSet::new();

    for (lhs, rhs) in sys {
        match lhs {
            Expression::Var(name) => {
                if !lhs_set.insert(name.clone()) {
                    return Err(Error::InvalidInput(format!(
                        "the variable '{}' appears in the left-hand side twice",
                        name
                    )));
                }
                lhs_vars.push(name.clone());
            }
            other => {
                return Err(Error::InvalidInput(format!(
                    "the left-hand side contains the expression '{}', which is not a variable",
                    other
                )));
            }
        }
        rhs_set.extend(variables(rhs));
    }

    for name in &rhs_set {
        if !lhs_set.contains(name) {
            return Err(Error::InvalidInput(format!(
                "the variable '{}' appears in the right-hand side but not in the left-hand side",
                name
            )));
        }
    }

    let rhs: Vec<Expression> = sys.iter().map(|(_, rhs)| rhs.clone()).collect();
    decompose_system(rhs, lhs_vars)
}
