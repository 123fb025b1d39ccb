//! Layered medical image model with viewer synchronization.
//!
//! A [`LayeredImage`] stacks same-grid [`ImageLayer`]s (an image plus masks,
//! activation maps, tool overlays); a [`LayeredImageViewer`] keeps one cached
//! [`LayerView`] per layer in sync with the model through signals and
//! composites them for display. A [`Journal`] of [`Record`]s projects many
//! layered images into a table with previews.

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod cli;
pub mod error;
pub mod id;
pub mod image;
pub mod inference;
pub mod io;
pub mod journal;
pub mod layer;
pub mod layered;
pub mod palette;
pub mod settings;
pub mod signal;
pub mod tools;
pub mod viewer;

pub use error::{Result, VisionError};
pub use id::{IdAllocator, LayerId};
pub use self::image::{DType, Image, ImageKind, PixelData, PixelRegion, ShapeChange, SpatialAttrs};
pub use journal::{AgeFormat, Column, IllustratedJournal, Journal, JournalTableModel, PatientInfo, Record};
pub use layer::{ImageLayer, Visibility};
pub use layered::LayeredImage;
pub use palette::Palette;
pub use settings::ViewerSettings;
pub use signal::{DataStorage, Signal, Subscription};
pub use tools::LayeredImageViewerTool;
pub use viewer::{LayerView, LayeredImageViewer};
