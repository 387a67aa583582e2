pub mod pca;
pub use pca::{
    CovarianceEigen, PcaBackend, PcaFit, Reduction, ReduceError, reduce, standardize,
};
