//! Patient records, their journal, and the table projection of a journal.
//!
//! A [`Journal`] is an ordered list of [`Record`]s, each owning one
//! [`LayeredImage`] and optional bone-age [`PatientInfo`]. It announces
//! structural changes in four phases (`record_adding`, mutate,
//! `record_added`, and likewise for removal). [`JournalTableModel`] mirrors
//! those as row signals and serves the table cells; [`IllustratedJournal`]
//! pairs the table with a viewer that shows the selected record.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use chrono::NaiveDate;
use image::{RgbaImage, imageops};
use kurbo::Size;
use uuid::Uuid;

use crate::error::{Result, VisionError};
use crate::image::Image;
use crate::layer::{ImageLayer, Visibility};
use crate::layered::LayeredImage;
use crate::settings::ViewerSettings;
use crate::signal::{DataStorage, Signal, Subscription};
use crate::viewer::{LayeredImageViewer, unpremultiplied};
use crate::{log_info, log_warn};

/// Name of the base layer created by [`Record::from_image`].
pub const IMAGE_LAYER_NAME: &str = "image";

/// Name of the soft segmentation layer shown in the activation map column.
pub const ACTIVATION_MAP_LAYER_NAME: &str = "Activation Map";

const DAYS_PER_YEAR: f64 = 365.25;
const DAYS_PER_MONTH: f64 = DAYS_PER_YEAR / 12.0;

// ============================================================================
// Patient metadata
// ============================================================================

/// Bone-age study data attached to a record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatientInfo {
    pub male: bool,
    pub birthdate: NaiveDate,
    /// Day the image was taken.
    pub image_date: NaiveDate,
    /// Predicted bone age in days, once a model has produced one.
    pub bone_age: Option<f64>,
}

impl PatientInfo {
    pub fn new(male: bool, birthdate: NaiveDate, image_date: NaiveDate) -> Self {
        Self {
            male,
            birthdate,
            image_date,
            bone_age: None,
        }
    }

    /// Chronological age on the image date, in days. Negative if the dates
    /// are swapped.
    pub fn age_in_image(&self) -> f64 {
        (self.image_date - self.birthdate).num_days() as f64
    }
}

/// How ages (stored in days) are shown in the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgeFormat {
    /// Fractional months, e.g. `"121.50"`.
    Months,
    /// Whole years and fractional months, e.g. `"10 / 1.50"`.
    #[default]
    YearsMonths,
}

impl AgeFormat {
    pub const DECIMALS: usize = 2;

    pub fn name(self) -> &'static str {
        match self {
            AgeFormat::Months => "Months",
            AgeFormat::YearsMonths => "Years / Months",
        }
    }

    pub fn abbr(self) -> &'static str {
        match self {
            AgeFormat::Months => "M",
            AgeFormat::YearsMonths => "Y / M",
        }
    }

    pub fn format(self, age_in_days: f64) -> String {
        match self {
            AgeFormat::Months => format!("{:.*}", Self::DECIMALS, days_to_months(age_in_days)),
            AgeFormat::YearsMonths => {
                let (years, months) = days_to_years_months(age_in_days);
                format!("{} / {:.*}", years, Self::DECIMALS, months)
            }
        }
    }
}

pub fn days_to_months(days: f64) -> f64 {
    days / DAYS_PER_MONTH
}

pub fn months_to_days(months: f64) -> f64 {
    months * DAYS_PER_MONTH
}

/// Whole years, then the remainder in months.
pub fn days_to_years_months(days: f64) -> (i64, f64) {
    let years = (days / DAYS_PER_YEAR).floor();
    (years as i64, (days - years * DAYS_PER_YEAR) / DAYS_PER_MONTH)
}

// ============================================================================
// Record
// ============================================================================

struct RecordInner {
    id: Uuid,
    layered_image: LayeredImage,
    patient: RefCell<Option<PatientInfo>>,
    patient_changed: Signal<Option<PatientInfo>>,
}

/// One patient record. Clones share the record.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .finish()
    }
}

impl Record {
    pub fn new(layered_image: LayeredImage) -> Self {
        Self {
            inner: Rc::new(RecordInner {
                id: Uuid::new_v4(),
                layered_image,
                patient: RefCell::new(None),
                patient_changed: Signal::new(),
            }),
        }
    }

    /// Record whose stack has a single base layer named `"image"`.
    pub fn from_image(image: Image) -> Result<Self> {
        Self::from_image_with(image, Visibility::default())
    }

    pub fn from_image_with(image: Image, visibility: Visibility) -> Result<Self> {
        let layered = LayeredImage::new();
        layered.add_layer_from_image(image, IMAGE_LAYER_NAME, visibility)?;
        Ok(Self::new(layered))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn layered_image(&self) -> &LayeredImage {
        &self.inner.layered_image
    }

    pub fn image_layer(&self) -> Option<ImageLayer> {
        self.inner.layered_image.layer_by_name(IMAGE_LAYER_NAME)
    }

    /// Display name: file name of the base image, else the record id.
    pub fn name(&self) -> String {
        self.inner
            .layered_image
            .base_layer()
            .and_then(|l| l.image())
            .and_then(|i| i.path_name())
            .unwrap_or_else(|| self.inner.id.to_string())
    }

    pub fn patient(&self) -> Option<PatientInfo> {
        *self.inner.patient.borrow()
    }

    /// Replace the patient metadata. `patient_changed` fires only on an
    /// actual change.
    pub fn set_patient(&self, patient: Option<PatientInfo>) {
        if self.inner.patient.replace(patient) != patient {
            self.inner.patient_changed.emit(&patient);
        }
    }

    pub fn patient_changed(&self) -> &Signal<Option<PatientInfo>> {
        &self.inner.patient_changed
    }

    pub fn ptr_eq(a: &Record, b: &Record) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

// ============================================================================
// Journal
// ============================================================================

pub type RecordEvent = (Record, usize);

#[derive(Default)]
struct JournalInner {
    records: RefCell<Vec<Record>>,
    record_adding: Signal<RecordEvent>,
    record_added: Signal<RecordEvent>,
    record_removing: Signal<RecordEvent>,
    record_removed: Signal<RecordEvent>,
    changed: Signal<()>,
}

#[derive(Clone, Default)]
pub struct Journal {
    inner: Rc<JournalInner>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal").field("records", &self.len()).finish()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.borrow().is_empty()
    }

    pub fn records(&self) -> Vec<Record> {
        self.inner.records.borrow().clone()
    }

    pub fn record(&self, index: usize) -> Option<Record> {
        self.inner.records.borrow().get(index).cloned()
    }

    pub fn record_by_id(&self, id: Uuid) -> Option<Record> {
        self.inner.records.borrow().iter().find(|r| r.id() == id).cloned()
    }

    pub fn record_index(&self, record: &Record) -> Option<usize> {
        self.inner.records.borrow().iter().position(|r| Record::ptr_eq(r, record))
    }

    /// Append `record`. Returns its index.
    pub fn add_record(&self, record: Record) -> Result<usize> {
        if self.record_by_id(record.id()).is_some() {
            return Err(VisionError::Validation(format!("record {} is already in the journal", record.id())));
        }
        let index = self.len();
        let event = (record.clone(), index);
        self.inner.record_adding.emit(&event);
        self.inner.records.borrow_mut().push(record.clone());
        log_info!("Record added: {} at row {}", record.name(), index);
        self.inner.record_added.emit(&event);
        self.notify_changed();
        Ok(index)
    }

    pub fn remove_record(&self, record: &Record) -> Result<()> {
        let Some(index) = self.record_index(record) else {
            return Err(VisionError::NotFound(format!("record {} is not in the journal", record.id())));
        };
        let event = (record.clone(), index);
        self.inner.record_removing.emit(&event);
        let Some(index) = self.record_index(record) else {
            log_warn!("Record {} vanished during record_removing", record.id());
            return Ok(());
        };
        self.inner.records.borrow_mut().remove(index);
        log_info!("Record removed: {} from row {}", record.name(), index);
        self.inner.record_removed.emit(&(record.clone(), index));
        self.notify_changed();
        Ok(())
    }

    pub fn record_adding(&self) -> &Signal<RecordEvent> {
        &self.inner.record_adding
    }

    pub fn record_added(&self) -> &Signal<RecordEvent> {
        &self.inner.record_added
    }

    pub fn record_removing(&self) -> &Signal<RecordEvent> {
        &self.inner.record_removing
    }

    pub fn record_removed(&self) -> &Signal<RecordEvent> {
        &self.inner.record_removed
    }

    pub fn ptr_eq(a: &Journal, b: &Journal) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl DataStorage for Journal {
    fn on_changed(&self, callback: impl Fn() + 'static) -> Subscription {
        self.inner.changed.connect(move |_| callback())
    }

    fn notify_changed(&self) {
        self.inner.changed.emit(&());
    }
}

// ============================================================================
// Table model
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Preview,
    Name,
    Gender,
    Birthdate,
    ImageDate,
    AgeInImage,
    BoneAge,
    ActivationMap,
}

impl Column {
    /// Columns of a plain image journal.
    pub const ALL: [Column; 2] = [Column::Preview, Column::Name];

    /// Columns of a bone-age study journal.
    pub const BONE_AGE: [Column; 8] = [
        Column::Preview,
        Column::Name,
        Column::Gender,
        Column::Birthdate,
        Column::ImageDate,
        Column::AgeInImage,
        Column::BoneAge,
        Column::ActivationMap,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Preview => "Preview",
            Column::Name => "Name",
            Column::Gender => "Gender",
            Column::Birthdate => "Date of Birth",
            Column::ImageDate => "Image Date",
            Column::AgeInImage => "Age in Image",
            Column::BoneAge => "Bone Age",
            Column::ActivationMap => "Activation Map Visibility",
        }
    }

    pub fn is_age(self) -> bool {
        matches!(self, Column::AgeInImage | Column::BoneAge)
    }
}

struct CachedPreview {
    bitmap: Option<Arc<RgbaImage>>,
    /// Keep the cache entry in step with the record's base image.
    _subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct TableState {
    journal: Option<Journal>,
    journal_subscriptions: Vec<Subscription>,
    previews: HashMap<Uuid, CachedPreview>,
    age_format: AgeFormat,
}

struct TableInner {
    preview_height: u32,
    columns: Vec<Column>,
    activation_map_layer: String,
    state: RefCell<TableState>,
    rows_inserting: Signal<usize>,
    rows_inserted: Signal<usize>,
    rows_removing: Signal<usize>,
    rows_removed: Signal<usize>,
    model_reset: Signal<()>,
}

/// Table over a journal. Cells are computed on demand from the records;
/// only previews are cached.
#[derive(Clone)]
pub struct JournalTableModel {
    inner: Rc<TableInner>,
}

impl JournalTableModel {
    /// Preview and Name columns.
    pub fn new(preview_height: u32) -> Self {
        Self::with_columns(preview_height, Column::ALL.to_vec(), ACTIVATION_MAP_LAYER_NAME)
    }

    /// `activation_map_layer` names the layer behind [`Column::ActivationMap`].
    pub fn with_columns(preview_height: u32, columns: Vec<Column>, activation_map_layer: &str) -> Self {
        Self {
            inner: Rc::new(TableInner {
                preview_height: preview_height.max(1),
                columns,
                activation_map_layer: activation_map_layer.to_owned(),
                state: RefCell::new(TableState::default()),
                rows_inserting: Signal::new(),
                rows_inserted: Signal::new(),
                rows_removing: Signal::new(),
                rows_removed: Signal::new(),
                model_reset: Signal::new(),
            }),
        }
    }

    pub fn journal(&self) -> Option<Journal> {
        self.inner.state.borrow().journal.clone()
    }

    /// Project `journal` (or nothing). Subscriptions and previews of the
    /// previous journal are dropped.
    pub fn set_journal(&self, journal: Option<Journal>) {
        let subscriptions = journal.as_ref().map(|j| self.subscribe_to(j)).unwrap_or_default();
        let (old_subscriptions, old_previews) = {
            let mut state = self.inner.state.borrow_mut();
            state.journal = journal;
            (
                std::mem::replace(&mut state.journal_subscriptions, subscriptions),
                std::mem::take(&mut state.previews),
            )
        };
        drop(old_subscriptions);
        drop(old_previews);
        self.inner.model_reset.emit(&());
    }

    fn subscribe_to(&self, journal: &Journal) -> Vec<Subscription> {
        let relay = |signal: &Signal<RecordEvent>, target: fn(&TableInner) -> &Signal<usize>, drop_preview: bool| {
            let weak = Rc::downgrade(&self.inner);
            signal.connect(move |(record, row)| {
                if let Some(inner) = weak.upgrade() {
                    if drop_preview {
                        let removed = inner.state.borrow_mut().previews.remove(&record.id());
                        drop(removed);
                    }
                    target(&inner).emit(row);
                }
            })
        };
        vec![
            relay(journal.record_adding(), |t| &t.rows_inserting, false),
            relay(journal.record_added(), |t| &t.rows_inserted, false),
            relay(journal.record_removing(), |t| &t.rows_removing, false),
            relay(journal.record_removed(), |t| &t.rows_removed, true),
        ]
    }

    pub fn row_count(&self) -> usize {
        self.journal().map_or(0, |j| j.len())
    }

    pub fn column_count(&self) -> usize {
        self.inner.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<Column> {
        self.inner.columns.get(index).copied()
    }

    pub fn column_index(&self, column: Column) -> Option<usize> {
        self.inner.columns.iter().position(|&c| c == column)
    }

    /// Header text; age columns carry the unit of the current age format.
    pub fn header(&self, index: usize) -> Option<String> {
        let column = self.column(index)?;
        Some(if column.is_age() {
            format!("{} ({})", column.header(), self.age_format().abbr())
        } else {
            column.header().to_owned()
        })
    }

    pub fn age_format(&self) -> AgeFormat {
        self.inner.state.borrow().age_format
    }

    /// Switch the age unit. Every age cell changes, so views get a reset.
    pub fn set_age_format(&self, format: AgeFormat) {
        let changed = {
            let mut state = self.inner.state.borrow_mut();
            std::mem::replace(&mut state.age_format, format) != format
        };
        if changed {
            self.inner.model_reset.emit(&());
        }
    }

    /// Text of a cell. `None` for the Preview and ActivationMap columns
    /// (see [`Self::preview`] and [`Self::activation_map_visible`]) and for
    /// patient columns of records without patient data.
    pub fn cell_text(&self, row: usize, column: Column) -> Option<String> {
        let record = self.record_for_row(row)?;
        if column == Column::Name {
            return Some(record.name());
        }
        let patient = record.patient()?;
        let format = self.age_format();
        match column {
            Column::Gender => Some(if patient.male { "Man" } else { "Woman" }.to_owned()),
            Column::Birthdate => Some(patient.birthdate.format("%d.%m.%Y").to_string()),
            Column::ImageDate => Some(patient.image_date.format("%d.%m.%Y").to_string()),
            Column::AgeInImage => Some(format.format(patient.age_in_image())),
            Column::BoneAge => patient.bone_age.map(|days| format.format(days)),
            Column::Preview | Column::Name | Column::ActivationMap => None,
        }
    }

    /// Visibility of the row's activation map layer; `None` if it has none.
    pub fn activation_map_visible(&self, row: usize) -> Option<bool> {
        let layer = self.activation_map_layer(row)?;
        Some(layer.visibility().visible)
    }

    pub fn set_activation_map_visible(&self, row: usize, visible: bool) -> Result<()> {
        let layer = self.activation_map_layer(row).ok_or_else(|| {
            VisionError::NotFound(format!(
                "row {} has no '{}' layer",
                row, self.inner.activation_map_layer
            ))
        })?;
        let visibility = layer.visibility();
        layer.set_visibility(Visibility::new(visible, visibility.opacity));
        Ok(())
    }

    fn activation_map_layer(&self, row: usize) -> Option<ImageLayer> {
        self.record_for_row(row)?
            .layered_image()
            .layer_by_name(&self.inner.activation_map_layer)
    }

    pub fn record_for_row(&self, row: usize) -> Option<Record> {
        self.journal()?.record(row)
    }

    pub fn row_for_record(&self, record: &Record) -> Option<usize> {
        self.journal()?.record_index(record)
    }

    pub fn name_at(&self, row: usize) -> Option<String> {
        self.record_for_row(row).map(|r| r.name())
    }

    /// Thumbnail of the record's base image, scaled to the preview height.
    /// Cached until that image changes.
    pub fn preview(&self, row: usize) -> Result<Option<Arc<RgbaImage>>> {
        let Some(record) = self.record_for_row(row) else {
            return Err(VisionError::NotFound(format!("no row {}", row)));
        };
        if let Some(cached) = self.inner.state.borrow().previews.get(&record.id()) {
            return Ok(cached.bitmap.clone());
        }

        let base = record.layered_image().base_layer();
        let bitmap = match base.as_ref().and_then(|l| l.image()) {
            Some(image) => Some(Arc::new(self.thumbnail(&image)?)),
            None => None,
        };
        let subscriptions = base.map(|layer| self.watch(&layer, record.id())).unwrap_or_default();
        self.inner.state.borrow_mut().previews.insert(
            record.id(),
            CachedPreview {
                bitmap: bitmap.clone(),
                _subscriptions: subscriptions,
            },
        );
        Ok(bitmap)
    }

    fn thumbnail(&self, image: &Image) -> Result<RgbaImage> {
        let slice = image.slice_count() / 2;
        let full = unpremultiplied(&image.to_display_rgba(slice)?);
        let (w, h) = full.dimensions();
        if h == 0 || w == 0 {
            return Ok(full);
        }
        let height = self.inner.preview_height;
        let width = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
        Ok(imageops::resize(&full, width, height, imageops::FilterType::Triangle))
    }

    fn watch(&self, layer: &ImageLayer, id: Uuid) -> Vec<Subscription> {
        let invalidate = move |inner: &TableInner| {
            // The entry owns the subscription being delivered; drop it
            // outside the borrow.
            let removed = inner.state.borrow_mut().previews.remove(&id);
            drop(removed);
        };
        let weak = Rc::downgrade(&self.inner);
        let updated = layer.image_updated().connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                invalidate(&inner);
            }
        });
        let weak = Rc::downgrade(&self.inner);
        let modified = layer.image_pixels_modified().connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                invalidate(&inner);
            }
        });
        vec![updated, modified]
    }

    pub fn has_cached_preview(&self, row: usize) -> bool {
        self.record_for_row(row)
            .is_some_and(|r| self.inner.state.borrow().previews.contains_key(&r.id()))
    }

    pub fn rows_inserting(&self) -> &Signal<usize> {
        &self.inner.rows_inserting
    }

    pub fn rows_inserted(&self) -> &Signal<usize> {
        &self.inner.rows_inserted
    }

    pub fn rows_removing(&self) -> &Signal<usize> {
        &self.inner.rows_removing
    }

    pub fn rows_removed(&self) -> &Signal<usize> {
        &self.inner.rows_removed
    }

    pub fn model_reset(&self) -> &Signal<()> {
        &self.inner.model_reset
    }
}

// ============================================================================
// Illustrated journal
// ============================================================================

struct IllustratedInner {
    table: JournalTableModel,
    viewer: LayeredImageViewer,
    viewport: RefCell<Size>,
    selected: RefCell<Option<Record>>,
    /// `record_removing` of the journal the table currently shows.
    journal_subscription: RefCell<Option<Subscription>>,
    _table_reset: RefCell<Option<Subscription>>,
}

/// Journal table plus a viewer showing the selected record.
///
/// Layer-view visibility and opacity follow the layer *name* across
/// records: when another record is selected, views of same-named layers
/// keep the settings the user chose on the previous one.
#[derive(Clone)]
pub struct IllustratedJournal {
    inner: Rc<IllustratedInner>,
}

impl IllustratedJournal {
    pub fn new(journal: Journal, settings: &ViewerSettings, viewport: Size) -> Self {
        Self::with_columns(journal, settings, viewport, Column::ALL.to_vec())
    }

    pub fn with_columns(journal: Journal, settings: &ViewerSettings, viewport: Size, columns: Vec<Column>) -> Self {
        let table = JournalTableModel::with_columns(settings.preview_height, columns, &settings.activation_map_layer_name);
        let illustrated = Self {
            inner: Rc::new(IllustratedInner {
                table,
                viewer: LayeredImageViewer::new(settings),
                viewport: RefCell::new(viewport),
                selected: RefCell::new(None),
                journal_subscription: RefCell::new(None),
                _table_reset: RefCell::new(None),
            }),
        };

        // Follow the table to whatever journal it is pointed at.
        let weak = Rc::downgrade(&illustrated.inner);
        let reset = illustrated.inner.table.model_reset().connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                IllustratedJournal { inner }.bind_journal();
            }
        });
        *illustrated.inner._table_reset.borrow_mut() = Some(reset);
        illustrated.inner.table.set_journal(Some(journal));
        illustrated
    }

    /// Show `journal` (or nothing) in the table.
    pub fn set_journal(&self, journal: Option<Journal>) {
        self.inner.table.set_journal(journal);
    }

    fn bind_journal(&self) {
        let removing = self.inner.table.journal().map(|journal| {
            let weak = Rc::downgrade(&self.inner);
            journal.record_removing().connect(move |(record, _)| {
                let Some(inner) = weak.upgrade() else { return };
                let this = IllustratedJournal { inner };
                let is_selected = this.selected_record().is_some_and(|s| Record::ptr_eq(&s, record));
                if is_selected && let Err(e) = this.select_record(None) {
                    log_warn!("Could not deselect removed record: {}", e);
                }
            })
        });
        let previous = self.inner.journal_subscription.replace(removing);
        drop(previous);

        let orphaned = self
            .selected_record()
            .is_some_and(|r| self.inner.table.row_for_record(&r).is_none());
        if orphaned && let Err(e) = self.select_record(None) {
            log_warn!("Could not clear selection after journal change: {}", e);
        }
    }

    pub fn table(&self) -> &JournalTableModel {
        &self.inner.table
    }

    pub fn viewer(&self) -> &LayeredImageViewer {
        &self.inner.viewer
    }

    pub fn selected_record(&self) -> Option<Record> {
        self.inner.selected.borrow().clone()
    }

    pub fn set_viewport(&self, viewport: Size) {
        *self.inner.viewport.borrow_mut() = viewport;
        self.inner.viewer.fit_image_in(viewport);
    }

    pub fn select_row(&self, row: usize) -> Result<()> {
        let record = self
            .inner
            .table
            .record_for_row(row)
            .ok_or_else(|| VisionError::NotFound(format!("no row {}", row)))?;
        self.select_record(Some(&record))
    }

    /// Show `record` in the viewer (or clear it).
    pub fn select_record(&self, record: Option<&Record>) -> Result<()> {
        if let Some(record) = record
            && self.inner.table.row_for_record(record).is_none()
        {
            return Err(VisionError::NotFound(format!("record {} is not in the journal", record.id())));
        }

        let viewer = &self.inner.viewer;
        let remembered: HashMap<String, Visibility> = viewer
            .layer_views()
            .iter()
            .map(|v| (v.name().to_owned(), v.visibility()))
            .collect();

        *self.inner.selected.borrow_mut() = record.cloned();
        viewer.set_data(record.map(|r| r.layered_image().clone()));

        for view in viewer.layer_views() {
            if let Some(visibility) = remembered.get(view.name()) {
                view.set_visibility(*visibility);
            }
        }
        viewer.fit_image_in(*self.inner.viewport.borrow());
        Ok(())
    }
}
