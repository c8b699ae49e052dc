//! Page object for the 3D real-estate scene.
//!
//! Wraps a [`PageDriver`] with the locators of the site and the load
//! sequence a splat scene needs before it is safe to capture.

use std::time::Duration;
use tracing::{debug, info};

use crate::config::{SceneSettings, TimeoutSettings};
use crate::driver::{Condition, DriverError, PageDriver};

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors raised while driving the scene page
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// A bounded wait expired
    #[error("timeout while loading 3D scene at step '{step}': {source}")]
    Timeout {
        step: &'static str,
        source: DriverError,
    },

    /// Any other failure while loading
    #[error("failed to load 3D scene at step '{step}': {source}")]
    Load {
        step: &'static str,
        source: DriverError,
    },

    /// Navigation click failed
    #[error("navigation to {section} failed: {source}")]
    Navigation {
        section: Section,
        source: DriverError,
    },

    /// The navigation bar does not look the way it should
    #[error("navigation check failed: {0}")]
    NavigationCheck(String),
}

impl SceneError {
    pub fn is_timeout(&self) -> bool {
        match self {
            SceneError::Timeout { .. } => true,
            SceneError::Navigation { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    fn at(step: &'static str, source: DriverError) -> Self {
        if source.is_timeout() {
            SceneError::Timeout { step, source }
        } else {
            SceneError::Load { step, source }
        }
    }
}

/// Top-level sections reachable from the navigation bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Home,
    Apartments,
    Amenities,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Home, Section::Apartments, Section::Amenities];

    /// Label shown in the navigation bar
    pub fn label(&self) -> &'static str {
        match self {
            Section::Home => "Home",
            Section::Apartments => "Apartments",
            Section::Amenities => "Amenities",
        }
    }

    /// Selector of the navigation item for this section
    pub fn selector(&self) -> String {
        format!("{}:has-text(\"{}\")", locators::NAV_ITEM, self.label())
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Element selectors of the scene site
pub mod locators {
    pub const CANVAS: &str = "canvas";
    pub const PROGRESS_CONTAINER: &str = ".progressBarOuterContainer";
    pub const PROGRESS_PERCENTAGE: &str = ".progressPercentage";
    pub const NAVBAR: &str = ".navbar";
    pub const NAV_LIST: &str = ".navlist";
    pub const NAV_ITEM: &str = ".navlist__item";
    pub const NAV_ITEM_ACTIVE: &str = ".navlist__item.active";
}

/// The scene page bound to a driver
pub struct ScenePage<'a, D: PageDriver> {
    driver: &'a mut D,
    settings: &'a SceneSettings,
    timeouts: &'a TimeoutSettings,
}

impl<'a, D: PageDriver> ScenePage<'a, D> {
    pub fn new(driver: &'a mut D, settings: &'a SceneSettings, timeouts: &'a TimeoutSettings) -> Self {
        Self {
            driver,
            settings,
            timeouts,
        }
    }

    /// Open the scene and wait until it is fully rendered.
    ///
    /// Order: page load, scene asset response, progress at 100%, progress
    /// overlay gone, canvas visible, settle pause.
    pub fn load_scene(&mut self) -> SceneResult<()> {
        let url = self.settings.url.clone();
        let asset = self.settings.asset.clone();
        let timeouts = self.timeouts;
        info!(url = %url, "loading 3D scene");

        self.driver
            .navigate(&url, timeouts.navigation)
            .map_err(|e| SceneError::at("navigation", e))?;

        self.wait(
            "scene asset",
            Condition::Response { url_contains: asset, status: 200 },
            timeouts.scene_load,
        )?;

        self.wait(
            "progress 100%",
            Condition::TextEquals {
                selector: locators::PROGRESS_PERCENTAGE.to_string(),
                text: "100%".to_string(),
            },
            timeouts.scene_load,
        )?;

        self.wait(
            "progress bar hidden",
            Condition::Hidden(locators::PROGRESS_CONTAINER.to_string()),
            timeouts.progress_hidden,
        )?;

        self.wait(
            "canvas visible",
            Condition::Visible(locators::CANVAS.to_string()),
            timeouts.canvas_visible,
        )?;

        self.driver.pause(self.timeouts.settle);
        info!("3D scene ready");
        Ok(())
    }

    /// Click the navigation item of a section
    pub fn navigate_to(&mut self, section: Section) -> SceneResult<()> {
        debug!(section = %section, "navigating");
        self.driver
            .click(&section.selector(), self.timeouts.navigation)
            .map_err(|source| SceneError::Navigation { section, source })
    }

    /// Wait for the navigation list to show up
    pub fn wait_for_navigation(&mut self) -> SceneResult<()> {
        let timeout = self.timeouts.navigation;
        self.wait(
            "navigation visible",
            Condition::Visible(locators::NAV_LIST.to_string()),
            timeout,
        )
    }

    /// Text of the active navigation item
    pub fn active_section(&mut self) -> SceneResult<Option<String>> {
        self.driver
            .text_content(locators::NAV_ITEM_ACTIVE)
            .map_err(|e| SceneError::at("active section", e))
    }

    /// Whether the active navigation item mentions the section label
    pub fn is_section_active(&mut self, section: Section) -> SceneResult<bool> {
        Ok(self
            .active_section()?
            .map(|text| text.to_lowercase().contains(&section.label().to_lowercase()))
            .unwrap_or(false))
    }

    /// The bar, the list and the three section links are visible, and there are exactly three items.
    pub fn verify_navigation_visible(&mut self) -> SceneResult<()> {
        let timeout = self.timeouts.navigation;
        let mut selectors = vec![locators::NAVBAR.to_string(), locators::NAV_LIST.to_string()];
        selectors.extend(Section::ALL.iter().map(Section::selector));

        for selector in selectors {
            self.driver
                .wait_for(&Condition::Visible(selector.clone()), timeout)
                .map_err(|e| SceneError::NavigationCheck(format!("{} not visible: {}", selector, e)))?;
        }

        let count = self
            .driver
            .count(locators::NAV_ITEM)
            .map_err(|e| SceneError::NavigationCheck(e.to_string()))?;
        if count != Section::ALL.len() {
            return Err(SceneError::NavigationCheck(format!(
                "expected {} navigation items, found {}",
                Section::ALL.len(),
                count
            )));
        }
        Ok(())
    }

    /// Give the driver back for capture
    pub fn driver(&mut self) -> &mut D {
        &mut *self.driver
    }

    fn wait(&mut self, step: &'static str, condition: Condition, timeout: Duration) -> SceneResult<()> {
        debug!(step, %condition, ?timeout, "waiting");
        self.driver
            .wait_for(&condition, timeout)
            .map_err(|e| SceneError::at(step, e))
    }
}
