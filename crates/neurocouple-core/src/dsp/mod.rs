//! Numeric routines that turn raw samples into metrics.
//!
//! Everything here is a pure function of its inputs: filters design their
//! coefficients on demand, spectra plan their FFTs per call, and nothing keeps
//! state between calls.

pub mod coherence;
pub mod comodulogram;
pub mod coupling;
pub mod filter;
pub mod fourier;
pub mod spectral;
pub mod window;
