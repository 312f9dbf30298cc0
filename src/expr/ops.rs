//! Operator overloads for [`Expression`].
//!
//! All operators build trees verbatim: no simplification, no folding.
//! Unary minus is sugar for multiplication by `-1`.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use super::{BinaryOp, Expression};

fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(op, Box::new(lhs), Box::new(rhs))
}

// ──────────────────────────────────────────────
//  Expression ⊗ Expression
// ──────────────────────────────────────────────

impl Add for Expression {
    type Output = Expression;
    fn add(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Add, self, rhs)
    }
}

impl Sub for Expression {
    type Output = Expression;
    fn sub(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Sub, self, rhs)
    }
}

impl Mul for Expression {
    type Output = Expression;
    fn mul(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Mul, self, rhs)
    }
}

impl Div for Expression {
    type Output = Expression;
    fn div(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Div, self, rhs)
    }
}

impl Neg for Expression {
    type Output = Expression;
    fn neg(self) -> Expression {
        binary(BinaryOp::Mul, Expression::Num(-1.0), self)
    }
}

// ──────────────────────────────────────────────
//  Expression ⊗ f64 and f64 ⊗ Expression
// ──────────────────────────────────────────────

impl Add<f64> for Expression {
    type Output = Expression;
    fn add(self, rhs: f64) -> Expression {
        binary(BinaryOp::Add, self, Expression::Num(rhs))
    }
}

impl Add<Expression> for f64 {
    type Output = Expression;
    fn add(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Add, Expression::Num(self), rhs)
    }
}

impl Sub<f64> for Expression {
    type Output = Expression;
    fn sub(self, rhs: f64) -> Expression {
        binary(BinaryOp::Sub, self, Expression::Num(rhs))
    }
}

impl Sub<Expression> for f64 {
    type Output = Expression;
    fn sub(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Sub, Expression::Num(self), rhs)
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;
    fn mul(self, rhs: f64) -> Expression {
        binary(BinaryOp::Mul, self, Expression::Num(rhs))
    }
}

impl Mul<Expression> for f64 {
    type Output = Expression;
    fn mul(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Mul, Expression::Num(self), rhs)
    }
}

impl Div<f64> for Expression {
    type Output = Expression;
    fn div(self, rhs: f64) -> Expression {
        binary(BinaryOp::Div, self, Expression::Num(rhs))
    }
}

impl Div<Expression> for f64 {
    type Output = Expression;
    fn div(self, rhs: Expression) -> Expression {
        binary(BinaryOp::Div, Expression::Num(self), rhs)
    }
}

// ──────────────────────────────────────────────
//  Compound assignment
// ──────────────────────────────────────────────

impl AddAssign for Expression {
    fn add_assign(&mut self, rhs: Expression) {
        let lhs = std::mem::replace(self, Expression::Num(0.0));
        *self = lhs + rhs;
    }
}

impl SubAssign for Expression {
    fn sub_assign(&mut self, rhs: Expression) {
        let lhs = std::mem::replace(self, Expression::Num(0.0));
        *self = lhs - rhs;
    }
}

impl MulAssign for Expression {
    fn mul_assign(&mut self, rhs: Expression) {
        let lhs = std::mem::replace(self, Expression::Num(0.0));
        *self = lhs * rhs;
    }
}

impl DivAssign for Expression {
    fn div_assign(&mut self, rhs: Expression) {
        let lhs = std::mem::replace(self, Expression::Num(0.0));
        *self = lhs / rhs;
    }
}
