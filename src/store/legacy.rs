//! # Format Detection & Migration
//!
//! Three payload shapes have shipped over time:
//!
//! | Format | Marker | Example |
//! |--------|--------|---------|
//! | Obfuscated v1 | single-letter keys, no `dataVersion` | `{"a":[{"a":"pkg","b":0,"c":[..]}],"b":{..},"c":false,"d":""}` |
//! | Flat preference | prefixed preference keys | `{"fAPP_INFO":["10\|1650000000000\|pkg"],"fgeneral_detect_mode":"recent"}` |
//! | Versioned | `dataVersion` | the current [`StoreDocument`] shape |
//!
//! [`parse_document`] runs the detectors in that order. The first detector
//! that recognizes the payload *and* converts it successfully wins; a failed
//! conversion hands off to the next one. The converted value is then raised to
//! [`CURRENT_DATA_VERSION`] one migration step at a time.

use super::document::{
    AppIconStyle, FilterMode, SortMode, SortingDirection, StoreDocument, WidgetSettings,
    COLOR_BLACK, COLOR_WHITE, CURRENT_DATA_VERSION, DEFAULT_WIDGET_ID,
};
use super::lenient;
use crate::usage::{AppUsageRecord, BUCKET_COUNT};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};

/// Which serialization a payload was recognized as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    ObfuscatedV1,
    FlatPreference,
    Versioned,
}

type Detector = fn(&Map<String, Value>) -> bool;
type Converter = fn(&Map<String, Value>) -> Result<Map<String, Value>>;

/// Ordered detector chain; `Versioned` accepts anything and must stay last
const FORMAT_CHAIN: &[(SourceFormat, Detector, Converter)] = &[
    (SourceFormat::ObfuscatedV1, is_obfuscated_v1, convert_obfuscated_v1),
    (SourceFormat::FlatPreference, is_flat_preference, convert_flat_preference),
    (SourceFormat::Versioned, is_versioned, convert_versioned),
];

type Migration = fn(&mut Map<String, Value>);

/// `MIGRATIONS[i]` upgrades a document from version `i + 1` to `i + 2`
const MIGRATIONS: &[Migration] = &[upgrade_1_to_2];

/// Parse a payload of any supported generation into the current document
pub fn parse_document(payload: &str) -> Result<(StoreDocument, SourceFormat)> {
    let value: Value = serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let Value::Object(root) = value else {
        bail!("Payload is not a JSON object");
    };

    for (format, detect, convert) in FORMAT_CHAIN {
        if !detect(&root) {
            continue;
        }
        match convert(&root) {
            Ok(mut canonical) => {
                if *format != SourceFormat::Versioned {
                    info!("Recovered legacy {:?} payload", format);
                }
                migrate(&mut canonical);
                return Ok((into_document(&canonical), *format));
            }
            Err(e) => debug!("{:?} detector matched but conversion failed: {:#}", format, e),
        }
    }

    bail!("Payload matches no known document format")
}

/// Raise a canonical document map to [`CURRENT_DATA_VERSION`].
///
/// Each step is additive and idempotent; a map already at the current
/// version is left untouched.
pub fn migrate(doc: &mut Map<String, Value>) {
    let mut version = doc
        .get("dataVersion")
        .and_then(lenient::as_i64)
        .map_or(1, |v| v.max(1)) as i32;

    if version > CURRENT_DATA_VERSION {
        warn!(
            "Document version {} is newer than supported version {}; loading as-is",
            version, CURRENT_DATA_VERSION
        );
        return;
    }

    while version < CURRENT_DATA_VERSION {
        if let Some(step) = MIGRATIONS.get((version - 1) as usize) {
            step(doc);
        }
        version += 1;
        info!("Migrated document to version {}", version);
    }
    doc.insert("dataVersion".to_string(), json!(version));
}

/// Version 2 introduced the Recommend sub-mode
fn upgrade_1_to_2(doc: &mut Map<String, Value>) {
    let Some(Value::Object(settings)) = doc.get_mut("widgetSettings") else {
        return;
    };
    for setting in settings.values_mut() {
        if let Value::Object(setting) = setting {
            let missing = setting
                .get("recommendSortMode")
                .map_or(true, Value::is_null);
            if missing {
                setting.insert("recommendSortMode".to_string(), json!("Balanced"));
            }
        }
    }
}

/// Build the typed document from a canonical map, field by field
fn into_document(doc: &Map<String, Value>) -> StoreDocument {
    let mut out = StoreDocument::default();
    out.widget_settings.clear();

    if let Some(version) = doc.get("dataVersion").and_then(lenient::as_i64) {
        out.set_data_version(version as i32);
    }

    if let Some(Value::Array(items)) = doc.get("appInfos") {
        out.app_infos = items
            .iter()
            .filter_map(|item| serde_json::from_value::<AppUsageRecord>(item.clone()).ok())
            .filter(|record| !record.package_name.is_empty())
            .collect();
    }

    if let Some(Value::Object(settings)) = doc.get("widgetSettings") {
        for (key, value) in settings {
            let Ok(widget_id) = key.trim().parse::<i32>() else {
                warn!("Skipping widget settings with non-numeric id {:?}", key);
                continue;
            };
            let Value::Object(fields) = value else {
                continue;
            };
            let settings = lenient::overlay(&WidgetSettings::for_widget(widget_id), fields);
            out.widget_settings.insert(widget_id, settings);
        }
    }

    if let Some(Value::Bool(pro)) = doc.get("isProMode") {
        out.is_pro_mode = *pro;
    }
    if let Some(Value::String(launcher)) = doc.get("homeLauncherPackageName") {
        out.home_launcher_package_name.clone_from(launcher);
    }

    out.ensure_default_widget();
    out
}

// ---------------------------------------------------------------------------
// Versioned
// ---------------------------------------------------------------------------

fn is_versioned(_root: &Map<String, Value>) -> bool {
    true
}

fn convert_versioned(root: &Map<String, Value>) -> Result<Map<String, Value>> {
    const KNOWN: [&str; 5] = [
        "dataVersion",
        "appInfos",
        "widgetSettings",
        "isProMode",
        "homeLauncherPackageName",
    ];
    if !KNOWN.iter().any(|key| root.contains_key(*key)) {
        bail!("No versioned document fields present");
    }
    Ok(root.clone())
}

// ---------------------------------------------------------------------------
// Obfuscated v1
// ---------------------------------------------------------------------------

/// Single-letter widget keys of the v1 payload, in declaration order
const V1_WIDGET_KEYS: [(&str, &str); 30] = [
    ("a", "widgetId"),
    ("b", "sortAppBy"),
    ("c", "filterMode"),
    ("d", "blockApps"),
    ("e", "allowApps"),
    ("f", "sortingDirection"),
    ("g", "pinnedApps"),
    ("h", "isTitleVisible"),
    ("i", "isTitleUpdateTimeVisible"),
    ("j", "titleText"),
    ("k", "appIconStyle"),
    ("l", "appIconPackPackage"),
    ("m", "isForceIconShapeClip"),
    ("n", "appIconSize"),
    ("o", "isAdvancedWidgetLayout"),
    ("p", "advLytIsHorVerIconGapSeparate"),
    ("q", "advLytHorIconGapSize"),
    ("r", "advLytVerIconGapSize"),
    ("s", "advLytIsHorVerListPaddingSeparate"),
    ("t", "advLytHorListPaddingSize"),
    ("u", "advLytVerListPaddingSize"),
    ("v", "isShowAppsName"),
    ("w", "appsNameSize"),
    ("x", "appsNameMargin"),
    ("y", "backgroundCornerRadius"),
    ("z", "isSetDarkModeColor"),
    ("A", "backgroundColor"),
    ("B", "backgroundDarkModeColor"),
    ("C", "textColor"),
    ("D", "textDarkModeColor"),
];

const V1_APP_KEYS: [(&str, &str); 3] = [
    ("a", "packageName"),
    ("b", "lastLaunched"),
    ("c", "launchedCount"),
];

fn is_obfuscated_v1(root: &Map<String, Value>) -> bool {
    root.contains_key("a") && !root.contains_key("dataVersion") && !root.contains_key("appInfos")
}

fn convert_obfuscated_v1(root: &Map<String, Value>) -> Result<Map<String, Value>> {
    let app_infos: Vec<Value> = match root.get("a") {
        Some(Value::Array(items)) => items.iter().filter_map(v1_app_info).collect(),
        // A lone flat entry in place of the list
        Some(Value::String(entry)) => parse_legacy_app_entry(entry)
            .and_then(|r| serde_json::to_value(r).ok())
            .into_iter()
            .collect(),
        _ => bail!("v1 app list is neither an array nor a flat entry"),
    };

    let mut widget_settings = Map::new();
    if let Some(Value::Object(settings)) = root.get("b") {
        for (id, value) in settings {
            if let Value::Object(fields) = value {
                let mut renamed = rename_keys(fields, &V1_WIDGET_KEYS);
                if let Ok(widget_id) = id.trim().parse::<i32>() {
                    renamed.insert("widgetId".to_string(), json!(widget_id));
                }
                widget_settings.insert(id.clone(), Value::Object(renamed));
            }
        }
    }

    let mut doc = Map::new();
    doc.insert("dataVersion".to_string(), json!(1));
    doc.insert("appInfos".to_string(), Value::Array(app_infos));
    doc.insert("widgetSettings".to_string(), Value::Object(widget_settings));
    if let Some(pro) = root.get("c").and_then(Value::as_bool) {
        doc.insert("isProMode".to_string(), json!(pro));
    }
    if let Some(launcher) = root.get("d").and_then(Value::as_str) {
        doc.insert("homeLauncherPackageName".to_string(), json!(launcher));
    }
    Ok(doc)
}

fn v1_app_info(item: &Value) -> Option<Value> {
    match item {
        Value::Object(fields) => Some(Value::Object(rename_keys(fields, &V1_APP_KEYS))),
        Value::String(entry) => {
            parse_legacy_app_entry(entry).and_then(|r| serde_json::to_value(r).ok())
        }
        _ => None,
    }
}

fn rename_keys(fields: &Map<String, Value>, table: &[(&str, &str)]) -> Map<String, Value> {
    table
        .iter()
        .filter_map(|(short, long)| fields.get(*short).map(|v| (long.to_string(), v.clone())))
        .collect()
}

// ---------------------------------------------------------------------------
// Flat preference
// ---------------------------------------------------------------------------

/// Preference keys of the flat format. In exported files they carry an `f`
/// (app preference) or `d` (default preference) prefix.
mod flat_keys {
    pub const APP_INFO_LIST: &str = "APP_INFO";
    pub const DETECT_MODE: &str = "general_detect_mode";
    pub const FILTER_MODE_IS_BLOCK: &str = "APP_FILTER_MODE_IS_BLOCK";
    pub const BLOCK_FILTER_LIST: &str = "APP_BLOCK_FILTER";
    pub const ALLOW_FILTER_LIST: &str = "APP_ALLOW_FILTER";
    pub const PIN_APP_FIRST_LIST: &str = "PIN_APP_FIRST_LIST";
    pub const SORTING_DIRECTION: &str = "app_list_sort_direction";
    pub const IS_PRO_MODE: &str = "IS_PRO_MODE";
    pub const LAUNCHER_PKG_NAME: &str = "general_set_launcher_package_name";
    pub const ICON_STYLE: &str = "ICON_STYLE";
    pub const ICON_PACK_PKG: &str = "ICON_PACK_PKG";
    pub const ICON_SHAPE_FORCE: &str = "ICON_SHAPE_FORCE";
    pub const IS_TITLE_VISIBLE: &str = "visual_title_visible";
    pub const IS_TITLE_UPDATE_TIME_VISIBLE: &str = "visual_title_update_time_visible";
    pub const TITLE_TEXT: &str = "visual_title_text";
    pub const ICON_SIZE: &str = "visual_icon_size";
    pub const IS_ADVANCED_ENABLED: &str = "visual_advanced_enabled";
    pub const IS_ICON_GAP_SEPARATE: &str = "visual_icon_gap_set_separately";
    pub const ICON_GAP_MARGIN: &str = "visual_icon_gap_margin";
    pub const ICON_GAP_VERTICAL_MARGIN: &str = "visual_icon_gap_vertical_margin";
    pub const IS_LIST_MARGIN_SEPARATE: &str = "visual_list_margin_set_separately";
    pub const LIST_MARGIN: &str = "visual_list_margin";
    pub const LIST_VERTICAL_MARGIN: &str = "visual_list_vertical_margin";
    pub const IS_SHOW_APP_NAME: &str = "visual_show_app_name";
    pub const APP_NAME_TEXT_SIZE: &str = "visual_app_name_size";
    pub const APP_NAME_MARGIN: &str = "visual_app_name_margin";
    pub const BG_CORNER_RADIUS: &str = "visual_bg_corner_radius";
    pub const SET_DARK_MODE_COLOR: &str = "visual_set_dark_mode_color";
    pub const BG_COLOR: &str = "visual_bg_color";
    pub const BG_COLOR_DARK: &str = "visual_bg_color_dark";
    pub const APP_NAME_COLOR: &str = "visual_app_name_color";
    pub const APP_NAME_COLOR_DARK: &str = "visual_app_name_color_dark";

    /// Keys whose presence marks a payload as the flat format
    pub const MARKERS: [&str; 5] = [
        APP_INFO_LIST,
        DETECT_MODE,
        FILTER_MODE_IS_BLOCK,
        PIN_APP_FIRST_LIST,
        IS_PRO_MODE,
    ];
}

/// Widget defaults for keys a flat payload leaves out. Exported files and raw
/// preference dumps shipped with different ones.
struct FlatDefaults {
    icon_size: i32,
    gap: i32,
    show_app_name: bool,
    app_name_margin: i32,
    corner_radius: i32,
    /// Exported files stored the radius at half scale
    corner_radius_scale: i32,
    background: i32,
    background_dark: i32,
    text: i32,
    text_dark: i32,
}

const EXPORTED_DEFAULTS: FlatDefaults = FlatDefaults {
    icon_size: 40,
    gap: 5,
    show_app_name: false,
    app_name_margin: 5,
    corner_radius: 22,
    corner_radius_scale: 2,
    background: COLOR_WHITE,
    background_dark: COLOR_BLACK,
    text: COLOR_BLACK,
    text_dark: COLOR_WHITE,
};

const PREFERENCE_DEFAULTS: FlatDefaults = FlatDefaults {
    icon_size: 45,
    gap: 3,
    show_app_name: true,
    app_name_margin: 3,
    corner_radius: 11,
    corner_radius_scale: 1,
    background: COLOR_BLACK,
    background_dark: COLOR_WHITE,
    text: COLOR_WHITE,
    text_dark: COLOR_BLACK,
};

/// Lookup helper that accepts both prefixed and bare preference keys
struct FlatPrefs<'a>(&'a Map<String, Value>);

impl FlatPrefs<'_> {
    /// Exported files prefix every key with `f` or `d`; raw preference dumps
    /// use bare keys
    fn is_exported(&self) -> bool {
        flat_keys::MARKERS.iter().any(|key| {
            ["f", "d"]
                .iter()
                .any(|prefix| self.0.contains_key(&format!("{prefix}{key}")))
        })
    }

    fn get(&self, key: &str) -> Option<&Value> {
        ["f", "d", ""]
            .iter()
            .find_map(|prefix| self.0.get(&format!("{prefix}{key}")))
            .filter(|v| !v.is_null())
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    fn int_or(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(lenient::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    fn strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }
}

fn is_flat_preference(root: &Map<String, Value>) -> bool {
    let has_version = root
        .get("dataVersion")
        .and_then(lenient::as_i64)
        .is_some_and(|v| v > 0);
    let prefs = FlatPrefs(root);
    !has_version && flat_keys::MARKERS.iter().any(|key| prefs.get(key).is_some())
}

fn convert_flat_preference(root: &Map<String, Value>) -> Result<Map<String, Value>> {
    use flat_keys::*;

    let prefs = FlatPrefs(root);
    let defaults = if prefs.is_exported() {
        &EXPORTED_DEFAULTS
    } else {
        &PREFERENCE_DEFAULTS
    };
    let mut widget = WidgetSettings::for_widget(DEFAULT_WIDGET_ID);

    widget.sort_mode = match prefs.string_or(DETECT_MODE, "recommend").as_str() {
        "accessibility" => SortMode::Count,
        "usage" => SortMode::Period,
        "recent" => SortMode::Recent,
        _ => SortMode::Recommend,
    };
    widget.filter_mode = if prefs.bool_or(FILTER_MODE_IS_BLOCK, true) {
        FilterMode::BlockList
    } else {
        FilterMode::AllowList
    };
    widget.block_apps = prefs.strings(BLOCK_FILTER_LIST).into_iter().collect();
    widget.allow_apps = prefs.strings(ALLOW_FILTER_LIST).into_iter().collect();
    widget.pinned_apps = prefs.strings(PIN_APP_FIRST_LIST).into_iter().collect();
    widget.sorting_direction = match prefs.string_or(SORTING_DIRECTION, "top_left").as_str() {
        "top_right" => SortingDirection::RightTop,
        "bottom_left" => SortingDirection::LeftBottom,
        "bottom_right" => SortingDirection::RightBottom,
        _ => SortingDirection::LeftTop,
    };

    widget.is_title_visible = prefs.bool_or(IS_TITLE_VISIBLE, true);
    widget.is_title_update_time_visible = prefs.bool_or(IS_TITLE_UPDATE_TIME_VISIBLE, true);
    widget.title_text = prefs.string_or(TITLE_TEXT, &widget.title_text);
    widget.app_icon_style = match prefs.int_or(ICON_STYLE, 0) {
        1 => AppIconStyle::Square,
        2 => AppIconStyle::Squircle,
        3 => AppIconStyle::Circle,
        4 => AppIconStyle::RoundedSquare,
        _ => AppIconStyle::System,
    };
    widget.app_icon_pack_package = prefs.string_or(ICON_PACK_PKG, "");
    widget.is_force_icon_shape_clip = prefs.bool_or(ICON_SHAPE_FORCE, false);
    widget.app_icon_size = prefs.int_or(ICON_SIZE, defaults.icon_size);

    widget.is_advanced_widget_layout = prefs.bool_or(IS_ADVANCED_ENABLED, false);
    widget.adv_lyt_is_hor_ver_icon_gap_separate = prefs.bool_or(IS_ICON_GAP_SEPARATE, false);
    widget.adv_lyt_hor_icon_gap_size = prefs.int_or(ICON_GAP_MARGIN, defaults.gap);
    widget.adv_lyt_ver_icon_gap_size = prefs.int_or(ICON_GAP_VERTICAL_MARGIN, defaults.gap);
    widget.adv_lyt_is_hor_ver_list_padding_separate =
        prefs.bool_or(IS_LIST_MARGIN_SEPARATE, false);
    widget.adv_lyt_hor_list_padding_size = prefs.int_or(LIST_MARGIN, defaults.gap);
    widget.adv_lyt_ver_list_padding_size = prefs.int_or(LIST_VERTICAL_MARGIN, defaults.gap);

    widget.is_show_apps_name = prefs.bool_or(IS_SHOW_APP_NAME, defaults.show_app_name);
    widget.apps_name_size = prefs.int_or(APP_NAME_TEXT_SIZE, 12);
    widget.apps_name_margin = prefs.int_or(APP_NAME_MARGIN, defaults.app_name_margin);
    widget.background_corner_radius = prefs
        .int_or(BG_CORNER_RADIUS, defaults.corner_radius)
        .saturating_mul(defaults.corner_radius_scale);
    widget.is_set_dark_mode_color = prefs.bool_or(SET_DARK_MODE_COLOR, false);
    widget.background_color = prefs.int_or(BG_COLOR, defaults.background);
    widget.background_dark_mode_color = prefs.int_or(BG_COLOR_DARK, defaults.background_dark);
    widget.text_color = prefs.int_or(APP_NAME_COLOR, defaults.text);
    widget.text_dark_mode_color = prefs.int_or(APP_NAME_COLOR_DARK, defaults.text_dark);

    let app_infos: Vec<Value> = prefs
        .strings(APP_INFO_LIST)
        .iter()
        .filter_map(|entry| parse_legacy_app_entry(entry))
        .filter_map(|record| serde_json::to_value(record).ok())
        .collect();

    let mut widget_settings = Map::new();
    widget_settings.insert(
        DEFAULT_WIDGET_ID.to_string(),
        serde_json::to_value(widget).context("Failed to encode migrated widget settings")?,
    );

    let mut doc = Map::new();
    doc.insert("dataVersion".to_string(), json!(1));
    doc.insert("appInfos".to_string(), Value::Array(app_infos));
    doc.insert("widgetSettings".to_string(), Value::Object(widget_settings));
    doc.insert(
        "isProMode".to_string(),
        json!(prefs.bool_or(IS_PRO_MODE, false)),
    );
    doc.insert(
        "homeLauncherPackageName".to_string(),
        json!(prefs.string_or(LAUNCHER_PKG_NAME, "")),
    );
    Ok(doc)
}

/// Parse one `|`-separated app entry of the flat format.
///
/// - `count|lastLaunched|package`: the aggregate count is spread evenly,
///   every bucket holding `round(count / 336)`
/// - `tag|c0,c1,...|lastLaunched|package`: explicit per-slot counts
/// - anything else: the first field is the package, with no history
///
/// Unparseable numeric fields fall back to zero. Entries without a package
/// name yield `None`.
pub fn parse_legacy_app_entry(entry: &str) -> Option<AppUsageRecord> {
    let fields: Vec<&str> = entry.split('|').collect();
    let parse_i64 = |s: &str| s.trim().parse::<i64>().unwrap_or(0);

    let record = match fields.as_slice() {
        [count, last_launched, package] => {
            let count = parse_i64(count).max(0);
            let per_slot = (count as f64 / BUCKET_COUNT as f64).round() as u64;
            AppUsageRecord::with_counts(
                package.trim(),
                parse_i64(last_launched),
                vec![per_slot; BUCKET_COUNT],
            )
        }
        [_, slots, last_launched, package] => {
            let counts = slots
                .split(',')
                .take(BUCKET_COUNT)
                .map(|s| parse_i64(s).max(0) as u64)
                .collect();
            AppUsageRecord::with_counts(package.trim(), parse_i64(last_launched), counts)
        }
        [package, ..] => AppUsageRecord::new(package.trim(), 0),
        [] => return None,
    };

    (!record.package_name.is_empty()).then_some(record)
}
