//! Distributed tensor-product B-spline discretizations on Cartesian domain decompositions
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod assembly;
pub mod bsplines;
pub mod cart;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod locate;
pub mod quadrature;
pub mod space;
pub mod stencil;
pub mod tools;
