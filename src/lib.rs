#![doc = "Flowbench public API"]
pub mod cli;
pub mod commands;

mod calibrate;
mod dataset;
mod eval;
mod model;
mod report;
mod sample;
mod synth;

#[doc(inline)]
pub use dataset::{load as load_dataset, AttrTable, Dataset, FlowData, Level, PairTable, UnitId};

#[doc(inline)]
pub use model::Model;

#[doc(inline)]
pub use sample::{MassSelection, SampleMatrix};

#[doc(inline)]
pub use calibrate::{calibrate, Calibration};

#[doc(inline)]
pub use eval::{evaluate, FitStats};

#[doc(inline)]
pub use synth::{synthesize, NoiseKind, Synthesis, SynthMeta, SynthOptions};
