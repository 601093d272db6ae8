//! End-to-end runs over scripted pages: concurrency, deadlines, and the
//! behaviour of the assembled report.

use std::sync::Arc;
use std::time::Duration;

use vizdiff_core::fakes::{element, PageFixture, ScriptedComparator, ScriptedRendererFactory};
use vizdiff_core::{
    CaptureFailure, CaptureTarget, Clip, ComparisonRun, ConfigError, FaultKind, GeometryMetric,
    IssueDetail, MemoryImageStore, Rect, RegionSpec, RgbaComparator, RunConfig, RunMetrics,
    Severity, Side, StaticInventory, StyleProbes, StyleProperty, ViewportProfile, VizdiffError,
};

const BASELINE: &str = "original";
const CANDIDATE: &str = "implemented";

fn config(regions: Vec<RegionSpec>, viewport: ViewportProfile) -> RunConfig {
    let mut config = RunConfig::new(
        CaptureTarget::new(BASELINE, "https://www.example.com/"),
        CaptureTarget::new(CANDIDATE, "http://localhost:3001/"),
    );
    config.viewport = viewport;
    config.regions = regions;
    config
}

fn site_regions() -> Vec<RegionSpec> {
    vec![
        RegionSpec::selector("header", "header").with_probes(StyleProbes {
            container: Some("header".to_string()),
            item: None,
            label: None,
        }),
        RegionSpec::selector("nav", "nav").with_probes(StyleProbes {
            container: None,
            item: Some("nav a".to_string()),
            label: None,
        }),
        RegionSpec::selector("footer", "footer"),
    ]
}

fn site(header_left: f64, nav_items: &[&str], footer: bool) -> PageFixture {
    let mut page = PageFixture::new()
        .with_element("header", element("", Rect::new(header_left, 0.0, 1600.0, 80.0)))
        .with_element("nav", element("", Rect::new(0.0, 80.0, 1600.0, 40.0)));
    for (i, item) in nav_items.iter().enumerate() {
        page = page.with_element(
            "nav a",
            element(item, Rect::new(20.0 + 100.0 * i as f64, 90.0, 80.0, 20.0)),
        );
    }
    if footer {
        page = page.with_element("footer", element("Footer", Rect::new(0.0, 800.0, 1600.0, 100.0)));
    }
    page
}

fn run_with(
    config: RunConfig,
    baseline: PageFixture,
    candidate: PageFixture,
    comparator: ScriptedComparator,
) -> ComparisonRun {
    let factory = Arc::new(
        ScriptedRendererFactory::new()
            .with_page(BASELINE, baseline)
            .with_page(CANDIDATE, candidate),
    );
    ComparisonRun::new(
        config,
        factory,
        Arc::new(MemoryImageStore::new()),
        Arc::new(comparator),
    )
    .unwrap()
}

#[tokio::test]
async fn missing_footer_yields_one_critical_and_diffs_the_rest() {
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        site(0.0, &["Home", "Trends"], true),
        site(0.0, &["Home", "Trends"], false),
        ScriptedComparator::new(),
    );
    let output = run.execute("run-footer").await;
    let summary = &output.report.summary;

    assert_eq!(summary.critical, 1);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.unavailable_regions, 1);
    assert_eq!(summary.compared_regions, 2);
    assert_eq!(output.report.unavailable[0].region, "footer");
    assert!(output.report.issues[0].issues[0].is_region_missing());
    assert_eq!(output.report.priorities[0].region, "footer");
}

#[tokio::test]
async fn centered_header_shifted_by_fifteen_is_one_critical_style_issue() {
    let regions = vec![RegionSpec::selector("header", "header").with_probes(StyleProbes {
        container: Some("header".to_string()),
        item: None,
        label: None,
    })];
    let run = run_with(
        config(regions, ViewportProfile::default()),
        site(0.0, &[], false),
        site(15.0, &[], false),
        ScriptedComparator::new(),
    );
    let output = run.execute("run-offset").await;
    let issues = &output.aggregation.issues;

    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.severity, Severity::Critical);
    assert_eq!(issue.magnitude, 15.0);
    assert!(matches!(
        issue.detail,
        IssueDetail::StyleMismatch {
            property: StyleProperty::Geometry(GeometryMetric::CenterOffset),
            ..
        }
    ));
}

fn hero_config() -> RunConfig {
    config(
        vec![RegionSpec::clip("hero", Clip::new(0.0, 0.0, 400.0, 600.0))],
        ViewportProfile::new(400, 600),
    )
}

fn hero_candidate() -> PageFixture {
    PageFixture::new().with_patch(Rect::new(0.0, 0.0, 10.0, 10.0), [255, 0, 0, 255])
}

#[tokio::test]
async fn hero_pixel_ratio_is_normalized_by_area() {
    let zero = run_with(
        hero_config(),
        PageFixture::new(),
        hero_candidate(),
        ScriptedComparator::new().with_pixels("hero", 0),
    )
    .execute("run-hero-0")
    .await;
    assert!(zero.aggregation.issues.is_empty());
    assert!(zero.report.summary.is_clean());

    let critical = run_with(
        hero_config(),
        PageFixture::new(),
        hero_candidate(),
        ScriptedComparator::new().with_pixels("hero", 3000),
    )
    .execute("run-hero-3000")
    .await;
    let issue = &critical.aggregation.issues[0];
    assert_eq!(issue.severity, Severity::Critical);
    assert!((issue.magnitude - 0.0125).abs() < 1e-12);
}

#[tokio::test]
async fn builtin_comparator_counts_and_masks_real_pixels() {
    let store = Arc::new(MemoryImageStore::new());
    let factory = Arc::new(
        ScriptedRendererFactory::new()
            .with_page(BASELINE, PageFixture::new())
            .with_page(CANDIDATE, hero_candidate()),
    );
    let comparator = Arc::new(RgbaComparator::new(store.clone()));
    let run = ComparisonRun::new(hero_config(), factory, store.clone(), comparator).unwrap();
    let output = run.execute("run-rgba").await;

    let issue = &output.aggregation.issues[0];
    match &issue.detail {
        IssueDetail::PixelDiff {
            differing_pixels,
            region_area,
            mask,
        } => {
            assert_eq!(*differing_pixels, 100);
            assert_eq!(*region_area, 240_000);
            assert_eq!(mask.as_ref().map(|m| m.key.as_str()), Some("diff/hero.png"));
        }
        other => panic!("expected pixel diff, got {other:?}"),
    }
    assert_eq!(issue.severity, Severity::Minor);
    assert_eq!(
        store.keys(),
        vec!["baseline/hero.png", "candidate/hero.png", "diff/hero.png"]
    );
}

#[tokio::test]
async fn identical_pages_skip_the_comparator() {
    let comparator = Arc::new(ScriptedComparator::new().with_pixels("header", 9999));
    let factory = Arc::new(
        ScriptedRendererFactory::new()
            .with_page(BASELINE, site(0.0, &["Home"], true))
            .with_page(CANDIDATE, site(0.0, &["Home"], true)),
    );
    let run = ComparisonRun::new(
        config(site_regions(), ViewportProfile::default()),
        factory,
        Arc::new(MemoryImageStore::new()),
        comparator.clone(),
    )
    .unwrap();
    let output = run.execute("run-identical").await;
    assert!(output.report.summary.is_clean());
    assert!(comparator.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn targets_are_captured_concurrently() {
    let slow = |page: PageFixture| page.with_load_delay(Duration::from_secs(1));
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        slow(site(0.0, &["Home"], true)),
        slow(site(0.0, &["Home"], true)),
        ScriptedComparator::new(),
    );

    let started = tokio::time::Instant::now();
    let output = run.execute("run-concurrent").await;
    let elapsed = started.elapsed();

    assert!(output.report.summary.is_clean());
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn run_deadline_keeps_completed_regions_and_flags_the_rest() {
    let mut config = config(site_regions(), ViewportProfile::default());
    config.timeouts.run_ms = 2_000;
    let run = run_with(
        config,
        site(0.0, &["Home"], true),
        site(0.0, &["Home"], true).with_screenshot_delay(Duration::from_millis(1_500)),
        ScriptedComparator::new(),
    );
    let output = run.execute("run-deadline").await;

    assert!(output.candidate.snapshot("header").unwrap().is_available());
    for region in ["nav", "footer"] {
        assert_eq!(
            output.candidate.snapshot(region).unwrap().error,
            Some(CaptureFailure::RunTimeout)
        );
    }
    assert_eq!(output.candidate.target_error, Some(CaptureFailure::RunTimeout));
    assert!(output.baseline.target_error.is_none());

    let summary = &output.report.summary;
    assert_eq!(summary.unavailable_regions, 2);
    assert_eq!(summary.critical, 2);
    assert_eq!(summary.compared_regions, 1);
}

#[tokio::test]
async fn repeated_runs_produce_identical_reports() {
    let make = || {
        run_with(
            config(site_regions(), ViewportProfile::default()),
            site(0.0, &["Home", "Trends"], true),
            site(4.0, &["Home", "Shop"], false)
                .with_patch(Rect::new(0.0, 0.0, 50.0, 50.0), [0, 0, 0, 255]),
            ScriptedComparator::new().with_pixels("header", 50),
        )
    };
    let first = make().execute("run-a").await;
    let second = make().execute("run-b").await;

    assert!(!first.report.issues.is_empty());
    assert_eq!(first.report, second.report);

    let kinds: Vec<(String, Severity)> = first
        .aggregation
        .issues
        .iter()
        .map(|i| (i.region.clone(), i.severity))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("header".to_string(), Severity::Minor),
            ("header".to_string(), Severity::Moderate),
            ("nav".to_string(), Severity::Moderate),
            ("nav".to_string(), Severity::Moderate),
            ("footer".to_string(), Severity::Critical),
        ]
    );
}

#[tokio::test]
async fn inventory_weights_reorder_priorities() {
    let inventory = StaticInventory::new().with_weight("nav", 10.0);
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        site(0.0, &["Home", "Trends"], true),
        site(0.0, &["Home", "Shop"], false),
        ScriptedComparator::new(),
    )
    .with_inventory(Arc::new(inventory));
    let output = run.execute("run-inventory").await;

    let ranked: Vec<(&str, f64)> = output
        .report
        .priorities
        .iter()
        .map(|p| (p.region.as_str(), p.total_impact))
        .collect();
    assert_eq!(ranked, vec![("nav", 40.0), ("footer", 3.0)]);
}

#[test]
fn malformed_catalog_fails_before_capture() {
    let regions = vec![
        RegionSpec::selector("header", "header"),
        RegionSpec::selector("header", "nav"),
    ];
    let factory = Arc::new(ScriptedRendererFactory::new());
    let result = ComparisonRun::new(
        config(regions, ViewportProfile::default()),
        factory.clone(),
        Arc::new(MemoryImageStore::new()),
        Arc::new(ScriptedComparator::new()),
    );
    assert!(matches!(
        result,
        Err(VizdiffError::Config(ConfigError::DuplicateRegion { .. }))
    ));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn failed_style_extraction_is_a_fault_not_content_drift() {
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        site(0.0, &["Home", "Trends"], true),
        site(0.0, &["Home", "Trends"], true).failing("nav a"),
        ScriptedComparator::new(),
    );
    let output = run.execute("run-style-failure").await;
    let summary = &output.report.summary;

    assert_eq!(summary.total, 0, "issues: {:?}", output.aggregation.issues);
    assert_eq!(summary.compared_regions, 3);
    assert_eq!(summary.degraded_regions, 1);
    assert_eq!(summary.faults, 1);
    assert_eq!(output.report.faults[0].region, "nav");
    assert_eq!(
        output.report.faults[0].kind,
        FaultKind::StylesUnavailable {
            side: Side::Candidate
        }
    );
    assert_eq!(output.report.degraded[0].side, Side::Candidate);
}

#[tokio::test(start_paused = true)]
async fn hanging_style_extraction_is_bounded_and_reported_as_fault() {
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        site(0.0, &["Home"], true).hanging("nav a"),
        site(0.0, &["Home"], true),
        ScriptedComparator::new(),
    );
    let output = run.execute("run-style-hang").await;

    assert!(output.baseline.target_error.is_none());
    assert!(output.baseline.snapshot("nav").unwrap().is_degraded());
    assert_eq!(output.report.summary.total, 0);
    assert_eq!(
        output.report.faults[0].kind,
        FaultKind::StylesUnavailable {
            side: Side::Baseline
        }
    );
}

#[tokio::test]
async fn repeated_runs_report_their_own_counts() {
    let run = run_with(
        config(site_regions(), ViewportProfile::default()),
        site(0.0, &["Home"], true),
        site(0.0, &["Home"], false),
        ScriptedComparator::new(),
    );
    let expected = RunMetrics {
        snapshots_captured: 5,
        regions_unavailable: 1,
        regions_degraded: 0,
        issues_emitted: 1,
    };

    let first = run.execute("run-first").await;
    let second = run.execute("run-second").await;
    assert_eq!(first.metrics, expected);
    assert_eq!(second.metrics, expected);
}
