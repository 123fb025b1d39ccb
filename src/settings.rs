//! Viewer and overlay settings, persisted as a `key=value` text file.
//!
//! Unknown keys are ignored and malformed values keep their defaults (with a
//! warning in the session log), so an old or hand-edited file never prevents
//! start-up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::journal::ACTIVATION_MAP_LAYER_NAME;
use crate::log_warn;
use crate::palette::Palette;

const SETTINGS_FILE: &str = "medlayers_settings.cfg";

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerSettings {
    /// Length of one smooth-zoom animation, in clock units.
    pub smooth_zoom_duration: f64,
    /// Clock units between two zoom ticks.
    pub smooth_zoom_interval: f64,
    /// Relative scale change of one full wheel-notch animation.
    pub zoom_in_factor: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub default_layer_opacity: f32,
    pub mask_layer_name: String,
    pub mask_opacity: f32,
    pub tool_mask_layer_name: String,
    pub tool_mask_opacity: f32,
    pub mask_color: [u8; 3],
    /// Layer holding soft segmentation output; its views open at
    /// `activation_map_opacity`.
    pub activation_map_layer_name: String,
    pub activation_map_opacity: f32,
    /// Height in pixels of journal preview thumbnails.
    pub preview_height: u32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            smooth_zoom_duration: 100.0,
            smooth_zoom_interval: 10.0,
            zoom_in_factor: 0.25,
            min_scale: 0.02,
            max_scale: 100.0,
            default_layer_opacity: 1.0,
            mask_layer_name: "masks".to_string(),
            mask_opacity: 0.5,
            tool_mask_layer_name: "tool_mask".to_string(),
            tool_mask_opacity: 0.5,
            mask_color: [0, 255, 0],
            activation_map_layer_name: ACTIVATION_MAP_LAYER_NAME.to_string(),
            activation_map_opacity: 0.5,
            preview_height: 60,
        }
    }
}

impl ViewerSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/medlayers/medlayers_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MedLayers\medlayers_settings.cfg
    /// On macOS:   ~/Library/Application Support/MedLayers/medlayers_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("medlayers");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("MedLayers").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("MedLayers")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Settings from the default location; defaults if the file is missing.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log_warn!("Could not read settings '{}': {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "smooth_zoom_duration" => set_parsed(&mut s.smooth_zoom_duration, key, val),
                "smooth_zoom_interval" => set_parsed(&mut s.smooth_zoom_interval, key, val),
                "zoom_in_factor" => set_parsed(&mut s.zoom_in_factor, key, val),
                "min_scale" => set_parsed(&mut s.min_scale, key, val),
                "max_scale" => set_parsed(&mut s.max_scale, key, val),
                "default_layer_opacity" => set_parsed(&mut s.default_layer_opacity, key, val),
                "mask_layer_name" if !val.is_empty() => s.mask_layer_name = val.to_string(),
                "mask_opacity" => set_parsed(&mut s.mask_opacity, key, val),
                "tool_mask_layer_name" if !val.is_empty() => s.tool_mask_layer_name = val.to_string(),
                "tool_mask_opacity" => set_parsed(&mut s.tool_mask_opacity, key, val),
                "mask_color" => match str_to_rgb(val) {
                    Some(rgb) => s.mask_color = rgb,
                    None => log_warn!("Settings: ignoring malformed mask_color '{}'", val),
                },
                "activation_map_layer_name" if !val.is_empty() => {
                    s.activation_map_layer_name = val.to_string()
                }
                "activation_map_opacity" => set_parsed(&mut s.activation_map_opacity, key, val),
                "preview_height" => set_parsed(&mut s.preview_height, key, val),
                _ => {}
            }
        }
        if s.min_scale <= 0.0 || s.min_scale > s.max_scale {
            log_warn!("Settings: invalid scale range {}..{}, using defaults", s.min_scale, s.max_scale);
            let d = Self::default();
            s.min_scale = d.min_scale;
            s.max_scale = d.max_scale;
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "smooth_zoom_duration={}\n\
             smooth_zoom_interval={}\n\
             zoom_in_factor={}\n\
             min_scale={}\n\
             max_scale={}\n\
             default_layer_opacity={}\n\
             mask_layer_name={}\n\
             mask_opacity={}\n\
             tool_mask_layer_name={}\n\
             tool_mask_opacity={}\n\
             mask_color={}\n\
             activation_map_layer_name={}\n\
             activation_map_opacity={}\n\
             preview_height={}\n",
            self.smooth_zoom_duration,
            self.smooth_zoom_interval,
            self.zoom_in_factor,
            self.min_scale,
            self.max_scale,
            self.default_layer_opacity,
            self.mask_layer_name,
            self.mask_opacity,
            self.tool_mask_layer_name,
            self.tool_mask_opacity,
            rgb_to_str(self.mask_color),
            self.activation_map_layer_name,
            self.activation_map_opacity,
            self.preview_height,
        )
    }

    /// Soft two-entry palette in `mask_color`. Callers pass it on explicitly;
    /// nothing in the layer model reads it from here.
    pub fn mask_palette(&self) -> Arc<Palette> {
        Palette::default_soft(self.mask_color).shared()
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, val: &str) {
    match val.parse() {
        Ok(v) => *slot = v,
        Err(_) => log_warn!("Settings: ignoring malformed {} '{}'", key, val),
    }
}

fn rgb_to_str(c: [u8; 3]) -> String {
    format!("{},{},{}", c[0], c[1], c[2])
}

/// Parse "r,g,b".
fn str_to_rgb(s: &str) -> Option<[u8; 3]> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() == 3 {
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        Some([r, g, b])
    } else {
        None
    }
}
