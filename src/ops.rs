//! Infix operators for [`Var`]. Each one calls the named constructor on the owning graph,
//! so `a * b` builds exactly the same node as `graph.mul(a, b)`.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::graph::Var;

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident) => {
        impl<'a> $trait for Var<'a> {
            type Output = Var<'a>;
            fn $method(self, rhs: Self) -> Self::Output {
                self.graph.$method(self, rhs)
            }
        }

        impl<'a> $trait<f64> for Var<'a> {
            type Output = Var<'a>;
            fn $method(self, rhs: f64) -> Self::Output {
                self.graph.$method(self, rhs)
            }
        }

        impl<'a> $trait<Var<'a>> for f64 {
            type Output = Var<'a>;
            fn $method(self, rhs: Var<'a>) -> Self::Output {
                rhs.graph.$method(self, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add);
impl_binary_op!(Sub, sub);
impl_binary_op!(Mul, mul);
impl_binary_op!(Div, div);

impl<'a> Neg for Var<'a> {
    type Output = Var<'a>;
    fn neg(self) -> Self::Output {
        self.graph.neg(self)
    }
}
