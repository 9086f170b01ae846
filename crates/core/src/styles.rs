//! Decade style catalog.
//!
//! The catalog is fixed and ordered: its order is the canonical display and
//! sort order of results, independent of the order requests complete in.

use crate::error::{AppError, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// One target look: a decade label and the prompt fragment describing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleDescriptor {
    pub id: String,
    pub prompt: String,
}

impl StyleDescriptor {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }
}

/// The five decades shipped with the application, in display order.
pub const DECADE_STYLES: &[(&str, &str)] = &[
    (
        "1960s",
        "1960s film photograph, medium grain, soft contrast, pastel palette, studio portrait lighting with a simple backdrop, period-accurate wardrobe and hairstyle",
    ),
    (
        "1970s",
        "1970s analog look, warm cast, muted saturation, subtle halation, background is a living room with wood paneling and vintage furniture, period-accurate wardrobe and hairstyle",
    ),
    (
        "1980s",
        "1980s glossy magazine aesthetic, punchy colours, neon accents, on-camera flash look, background with neon geometric shapes and laser grids, period-accurate wardrobe and hairstyle",
    ),
    (
        "1990s",
        "1990s 35mm compact camera vibe, mild flash, slight green-magenta cast, early streetwear styling, slightly out-of-focus urban background, period-accurate hair",
    ),
    (
        "2000s",
        "early digital camera look, slight sensor noise, cooler white balance, denim-and-tee fashion, brightly lit minimalist interior background, period-accurate hair",
    ),
];

/// Ordered, immutable set of styles. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleCatalog {
    styles: Arc<[StyleDescriptor]>,
}

impl StyleCatalog {
    /// Builds a catalog, preserving the given order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the list is empty or an id repeats.
    pub fn new(styles: Vec<StyleDescriptor>) -> Result<Self> {
        if styles.is_empty() {
            return Err(AppError::config("Style catalog must not be empty"));
        }
        let mut seen = HashSet::new();
        for style in &styles {
            if !seen.insert(style.id.as_str()) {
                return Err(AppError::config(format!("Duplicate style id: {}", style.id)));
            }
        }
        Ok(Self {
            styles: styles.into(),
        })
    }

    /// The reference catalog, 1960s through 2000s.
    pub fn decades() -> Self {
        let styles: Vec<StyleDescriptor> = DECADE_STYLES
            .iter()
            .map(|(id, prompt)| StyleDescriptor::new(*id, *prompt))
            .collect();
        Self {
            styles: styles.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleDescriptor> {
        self.styles.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().map(|s| s.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&StyleDescriptor> {
        self.styles.iter().find(|s| s.id == id)
    }

    /// Looks up a style, failing for ids outside the catalog.
    pub fn resolve(&self, id: &str) -> Result<&StyleDescriptor> {
        self.get(id).ok_or_else(|| AppError::UnknownStyle(id.to_string()))
    }

    /// Canonical position of `id`; unknown ids sort last.
    pub fn position(&self, id: &str) -> usize {
        self.styles
            .iter()
            .position(|s| s.id == id)
            .unwrap_or(usize::MAX)
    }

    /// Stable sort of arbitrary items by the catalog position of their id.
    pub fn sort_by_style<T>(&self, items: &mut [T], id_of: impl Fn(&T) -> &str) {
        items.sort_by_key(|item| self.position(id_of(item)));
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::decades()
    }
}
