//! Integration tests driving the scene page object into a comparison

use tempfile::TempDir;

use scene_vision::config::Config;
use scene_vision::driver::Condition;
use scene_vision::scene::locators;
use scene_vision::{
    BaselineStore, ComparisonEngine, Frame, MockPage, PixelOracle, RecordingSink, ResultReporter, ResultsDir,
    ScenePage, Section,
};

fn engine(tmp: &TempDir, config: &Config) -> ComparisonEngine {
    ComparisonEngine::new(
        BaselineStore::new(tmp.path().join("tests"), &config.baseline.default_suite),
        Box::new(PixelOracle::from_settings(&config.pixel)),
        ResultsDir::new(tmp.path().join("test-results")),
        config.timeouts.clone(),
        config.oracle.threshold,
    )
}

fn loaded_page() -> MockPage {
    let mut page = MockPage::new("chromium");
    page.set_count(locators::NAV_ITEM, 3)
        .set_text(locators::NAV_ITEM_ACTIVE, "Apartments")
        .push_frame(Frame::new(32, 18, [12, 12, 30]).to_png());
    page
}

#[test]
fn test_scene_load_navigate_and_compare() {
    let tmp = TempDir::new().expect("temp dir");
    let config = Config::defaults();
    let engine = engine(&tmp, &config);
    let mut page = loaded_page();

    {
        let mut scene = ScenePage::new(&mut page, &config.scene, &config.timeouts);
        scene.load_scene().expect("scene loads");
        scene.verify_navigation_visible().expect("navigation visible");
        scene.navigate_to(Section::Apartments).expect("navigation");
        assert!(scene.is_section_active(Section::Apartments).expect("active"));
    }

    let first = engine.run(&mut page, "3d-apartments-view").expect("seed");
    assert!(first.is_baseline);

    let second = engine.run(&mut page, "3d-apartments-view").expect("compare");
    let mut sink = RecordingSink::new();
    ResultReporter::new(config.oracle.threshold)
        .finish(&second, &mut sink)
        .expect("unchanged scene passes");

    let navigated = page.calls.iter().position(|c| c.starts_with("click")).expect("clicked");
    let captured = page.calls.iter().position(|c| c == "capture").expect("captured");
    assert!(navigated < captured);
    assert_eq!(page.paused, config.timeouts.settle);
}

#[test]
fn test_scene_timeout_names_the_wait() {
    let config = Config::defaults();
    let mut page = loaded_page();
    page.stall(Condition::Hidden(locators::PROGRESS_CONTAINER.to_string()));

    let err = ScenePage::new(&mut page, &config.scene, &config.timeouts)
        .load_scene()
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("progress bar hidden"));
    assert_eq!(page.capture_attempts(), 0);
}

#[test]
fn test_missing_navigation_item_fails_check() {
    let config = Config::defaults();
    let mut page = loaded_page();
    page.set_count(locators::NAV_ITEM, 2);

    let err = ScenePage::new(&mut page, &config.scene, &config.timeouts)
        .verify_navigation_visible()
        .unwrap_err();
    assert!(err.to_string().contains("expected 3 navigation items, found 2"));
}
