mod common;

use common::{Effect, FakeDriver, FakeElement};
use std::path::PathBuf;
use std::sync::Arc;
use stepwise_engine::alias::AliasStore;
use stepwise_engine::config::StepwiseConfig;
use stepwise_engine::executor::{ActionExecutor, Phase};
use stepwise_engine::protocol::{Action, ActionKind, ActionType};
use stepwise_engine::error::ActionError;

fn executor() -> ActionExecutor {
    executor_with(StepwiseConfig::default())
}

fn executor_with(config: StepwiseConfig) -> ActionExecutor {
    ActionExecutor::new(Arc::new(AliasStore::in_memory()), Arc::new(config))
}

// ============================================================
// Click
// ============================================================

#[tokio::test]
async fn test_click_escalates_to_forced_rung() {
    let mut driver = FakeDriver::new("https://shop.test/checkout-step-two.html");
    let finish = driver.add(FakeElement::new("button").attr("id", "finish").text("Finish").click_blocked());

    let execution = executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Finish"))
        .await
        .unwrap();
    assert_eq!(
        execution.phases,
        vec![Phase::Resolving, Phase::Interacting, Phase::Settled]
    );
    assert_eq!(
        driver.calls_matching(&format!("click#{}", finish)),
        vec![format!("click#{} default", finish), format!("click#{} forced", finish)]
    );
    assert!(driver.calls_matching("script_click").is_empty());
}

#[tokio::test]
async fn test_click_falls_back_to_script_click() {
    let mut driver = FakeDriver::new("https://shop.test/");
    let overlayed = driver.add(
        FakeElement::new("button")
            .text("Continue")
            .click_blocked()
            .force_blocked()
            .on_click(Effect::Navigate("https://shop.test/step-two".into())),
    );

    executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Continue"))
        .await
        .unwrap();
    assert_eq!(driver.calls_matching("script_click"), vec![format!("script_click#{}", overlayed)]);
    assert_eq!(driver.url, "https://shop.test/step-two");
}

#[tokio::test]
async fn test_click_reports_last_rung_error() {
    let mut driver = FakeDriver::new("https://shop.test/");
    driver.add(
        FakeElement::new("button")
            .text("Delete")
            .click_blocked()
            .force_blocked()
            .script_blocked(),
    );

    let err = executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Delete"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Driver(_)));
    assert!(err.to_string().contains("element is disabled"));
    assert_eq!(driver.calls_matching("click#").len(), 2);
}

#[tokio::test]
async fn test_click_missing_target_is_not_found() {
    let mut driver = FakeDriver::new("https://shop.test/");
    driver.add(FakeElement::new("button").text("Login"));

    let err = executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Checkout"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "click: target not found: \"Checkout\"");
}

#[tokio::test]
async fn test_click_uses_value_when_target_is_empty() {
    let mut driver = FakeDriver::new("https://shop.test/");
    let login = driver.add(FakeElement::new("button").attr("id", "login-button").text("Login"));

    executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "").with_value("Login"))
        .await
        .unwrap();
    assert_eq!(driver.calls_matching("click#"), vec![format!("click#{} default", login)]);
}

#[tokio::test]
async fn test_click_on_checked_checkbox_is_idempotent() {
    let mut driver = FakeDriver::new("https://forms.test/");
    driver.add(FakeElement::new("label").attr("for", "terms").text("Accept terms"));
    let terms = driver.add(
        FakeElement::new("input")
            .attr("type", "checkbox")
            .attr("id", "terms")
            .checked(),
    );
    let exec = executor();

    for _ in 0..2 {
        exec.execute(&mut driver, &Action::new(ActionType::Click, "Accept terms"))
            .await
            .unwrap();
        assert!(driver.element(terms).checked);
    }
    assert!(driver.calls_matching(&format!("click#{}", terms)).is_empty());
}

#[tokio::test]
async fn test_checkbox_that_ignores_check_is_forced() {
    let mut driver = FakeDriver::new("https://forms.test/");
    let row = driver.add(FakeElement::new("div").text("Remember me"));
    let remember = driver.add(
        FakeElement::new("input")
            .attr("type", "checkbox")
            .hidden()
            .check_needs_force()
            .child_of(row),
    );

    let execution = executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Remember me"))
        .await
        .unwrap();
    assert!(driver.element(remember).checked);
    assert!(execution.phases.contains(&Phase::Verifying));
    assert_eq!(
        driver.calls_matching(&format!("check#{}", remember)),
        vec![
            format!("check#{} force=false", remember),
            format!("check#{} force=true", remember)
        ]
    );
}

#[tokio::test]
async fn test_failed_check_clicks_associated_label() {
    let mut driver = FakeDriver::new("https://forms.test/");
    let label = driver.add(FakeElement::new("label").attr("for", "news").text("Newsletter"));
    let news = driver.add(
        FakeElement::new("input")
            .attr("type", "checkbox")
            .attr("id", "news")
            .hidden()
            .check_fails(),
    );

    executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Newsletter"))
        .await
        .unwrap();
    assert!(driver.element(news).checked);
    assert_eq!(
        driver.calls_matching(&format!("click#{}", label)),
        vec![format!("click#{} default", label)]
    );
}

#[tokio::test]
async fn test_aria_switch_gets_plain_click() {
    let mut driver = FakeDriver::new("https://forms.test/");
    let switch = driver.add(
        FakeElement::new("div")
            .attr("role", "switch")
            .attr("aria-checked", "false")
            .text("Dark mode"),
    );

    executor()
        .execute(&mut driver, &Action::new(ActionType::Click, "Dark mode"))
        .await
        .unwrap();
    assert_eq!(driver.calls_matching("click#"), vec![format!("click#{} default", switch)]);
    assert!(driver.calls_matching("check#").is_empty());
}

// ============================================================
// Fill
// ============================================================

#[tokio::test]
async fn test_fill_retypes_when_assignment_is_ignored() {
    let mut driver = FakeDriver::new("https://shop.test/");
    let user = driver.add(
        FakeElement::new("input")
            .attr("id", "user-name")
            .attr("placeholder", "Username")
            .ignores_assignment(),
    );

    let execution = executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::Fill, "Username").with_value("standard_user"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(user).value, "standard_user");
    assert!(driver.calls.contains(&"press Control+A".to_string()));
    assert!(driver.calls.contains(&"type standard_user".to_string()));
    assert!(driver.calls.contains(&format!("event#{} change", user)));
    assert!(driver.calls.contains(&format!("blur#{}", user)));
    assert_eq!(execution.phases.last(), Some(&Phase::Settled));
}

#[tokio::test]
async fn test_fill_assigns_directly_when_it_sticks() {
    let mut driver = FakeDriver::new("https://shop.test/");
    let password = driver.add(
        FakeElement::new("input")
            .attr("id", "password")
            .attr("type", "password"),
    );

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::Fill, "Password").with_value("secret_sauce"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(password).value, "secret_sauce");
    assert!(driver.calls_matching("type ").is_empty());
}

#[tokio::test]
async fn test_fill_without_field_is_not_found() {
    let mut driver = FakeDriver::new("https://shop.test/");
    driver.add(FakeElement::new("button").text("Login"));

    let err = executor()
        .execute(&mut driver, &Action::new(ActionType::Fill, "Zip").with_value("12345"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::TargetNotFound { ref action, .. } if action == "fill"));
}

// ============================================================
// Select / combo
// ============================================================

#[tokio::test]
async fn test_native_select_by_label() {
    let mut driver = FakeDriver::new("https://forms.test/");
    driver.add(FakeElement::new("label").attr("for", "country").text("Country"));
    let country = driver.add(
        FakeElement::new("select")
            .attr("id", "country")
            .options(&["United States", "Canada", "Mexico"]),
    );
    let exec = executor();

    exec.execute(&mut driver, &Action::new(ActionType::Select, "Country").with_value("canada"))
        .await
        .unwrap();
    assert_eq!(driver.element(country).value, "Canada");

    let err = exec
        .execute(&mut driver, &Action::new(ActionType::Select, "Country").with_value("Narnia"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AdapterProtocol { .. }));
    assert!(err.to_string().contains("no option matched"));
}

#[tokio::test]
async fn test_combo_select_opens_custom_widget() {
    let mut driver = FakeDriver::new("https://forms.test/");
    let list = driver.add(FakeElement::new("ul").attr("role", "listbox").detached());
    let option = driver.add(
        FakeElement::new("li")
            .attr("role", "option")
            .text("India")
            .detached()
            .child_of(list),
    );
    let trigger = driver.add(
        FakeElement::new("div")
            .attr("role", "combobox")
            .attr("aria-label", "Select Country")
            .on_click(Effect::Reveal(list))
            .on_click(Effect::Reveal(option)),
    );

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::ComboSelect, "Country").with_value("India"),
        )
        .await
        .unwrap();
    assert_eq!(driver.calls_matching(&format!("click#{}", option)).len(), 1);
    assert!(driver.calls.contains(&"press Escape".to_string()));
    assert!(driver.calls_matching("press Enter").is_empty());
    assert_eq!(driver.calls_matching(&format!("click#{}", trigger)).len(), 1);
}

#[tokio::test]
async fn test_combo_select_without_option_fails_verification() {
    let mut driver = FakeDriver::new("https://forms.test/");
    driver.add(
        FakeElement::new("div")
            .attr("role", "combobox")
            .attr("aria-label", "Language"),
    );

    let err = executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::ComboSelect, "Language").with_value("Klingon"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AdapterProtocol { .. }));
    assert!(driver.calls.contains(&"press End".to_string()));
    assert!(driver.calls.contains(&"press Enter".to_string()));
}

// ============================================================
// Dates
// ============================================================

#[tokio::test]
async fn test_native_date_input_is_filled_with_iso() {
    let mut driver = FakeDriver::new("https://travel.test/");
    let departure = driver.add(
        FakeElement::new("input")
            .attr("type", "date")
            .attr("aria-label", "Departure date"),
    );

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::DateSet, "Departure").with_value("2031-07-04T10:00"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(departure).value, "2031-07-04");
}

#[tokio::test]
async fn test_unresolved_date_hint_uses_first_native_date_input() {
    let mut driver = FakeDriver::new("https://travel.test/");
    let check_in = driver.add(FakeElement::new("input").attr("type", "date").attr("id", "ci"));
    let check_out = driver.add(FakeElement::new("input").attr("type", "date").attr("id", "co"));

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::DateSet, "Trip").with_value("2031-07-04"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(check_in).value, "2031-07-04");
    assert_eq!(driver.element(check_out).value, "");
}

#[tokio::test]
async fn test_calendar_pages_to_month_and_picks_day() {
    let mut driver = FakeDriver::new("https://travel.test/");
    driver.add(
        FakeElement::new("input")
            .attr("type", "text")
            .attr("aria-label", "Pickup date")
            .attr("readonly", ""),
    );
    let header = driver.add(FakeElement::new("div").attr("class", "month").text("January 2099"));
    driver.add(
        FakeElement::new("button")
            .attr("aria-label", "Next month")
            .on_click(Effect::CycleText(
                header,
                vec!["February 2099".into(), "March 2099".into()],
            )),
    );
    driver.add(FakeElement::new("td").attr("role", "gridcell").text("14"));
    let fifteenth = driver.add(FakeElement::new("td").attr("role", "gridcell").text("15"));

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::DateSet, "Pickup date").with_value("2099-03-15"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(header).text, "March 2099");
    assert_eq!(
        driver.calls_matching(&format!("click#{}", fifteenth)),
        vec![format!("click#{} default", fifteenth)]
    );
}

#[tokio::test]
async fn test_calendar_paging_is_bounded() {
    let mut config = StepwiseConfig::default();
    config.limits.calendar_max_pages = 3;
    let mut driver = FakeDriver::new("https://travel.test/");
    driver.add(FakeElement::new("input").attr("aria-label", "Return date"));
    driver.add(FakeElement::new("div").text("January 2099"));
    let next = driver.add(FakeElement::new("button").attr("title", "Next"));

    let err = executor_with(config)
        .execute(
            &mut driver,
            &Action::new(ActionType::DateSet, "Return date").with_value("2150-01-01"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AdapterProtocol { .. }));
    assert!(err.to_string().contains("not reached after 3 pages"));
    assert_eq!(driver.calls_matching(&format!("click#{}", next)).len(), 3);
}

#[tokio::test]
async fn test_date_rejects_non_iso_value() {
    let mut driver = FakeDriver::new("https://travel.test/");
    let err = executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::DateSet, "Departure").with_value("next friday"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AdapterProtocol { .. }));
}

// ============================================================
// Upload / navigation / assertions
// ============================================================

#[tokio::test]
async fn test_upload_reveals_hidden_file_input() {
    let mut driver = FakeDriver::new("https://jobs.test/apply");
    let input = driver.add(FakeElement::new("input").attr("type", "file").detached());
    driver.add(
        FakeElement::new("button")
            .text("Upload resume")
            .on_click(Effect::Reveal(input)),
    );

    executor()
        .execute(
            &mut driver,
            &Action::new(ActionType::FileUpload, "Upload resume").with_value("/tmp/cv.pdf"),
        )
        .await
        .unwrap();
    assert_eq!(driver.element(input).files, vec![PathBuf::from("/tmp/cv.pdf")]);
}

#[tokio::test]
async fn test_upload_without_path_is_protocol_error() {
    let mut driver = FakeDriver::new("https://jobs.test/apply");
    driver.add(FakeElement::new("input").attr("type", "file"));

    let err = executor()
        .execute(&mut driver, &Action::new(ActionType::FileUpload, "Resume"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no file path given"));
}

#[tokio::test]
async fn test_relative_navigation_joins_current_url() {
    let mut driver = FakeDriver::new("https://shop.test/inventory.html");

    executor()
        .execute(&mut driver, &Action::new(ActionType::Navigate, "/cart.html"))
        .await
        .unwrap();
    assert_eq!(driver.url, "https://shop.test/cart.html");
}

#[tokio::test]
async fn test_assert_url_contains() {
    let mut driver = FakeDriver::new("https://shop.test/checkout-complete.html");
    let exec = executor();

    exec.execute(
        &mut driver,
        &Action::new(ActionType::AssertUrlContains, "").with_value("Checkout-Complete"),
    )
    .await
    .unwrap();

    let err = exec
        .execute(&mut driver, &Action::new(ActionType::AssertUrlContains, "inventory"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AssertionFailed(_)));
}

#[tokio::test]
async fn test_assert_text_requires_visibility() {
    let mut driver = FakeDriver::new("https://shop.test/");
    driver.add(FakeElement::new("h2").text("Thank you for your order!"));
    driver.add(FakeElement::new("p").text("Out of stock").hidden());
    let exec = executor();

    exec.execute(&mut driver, &Action::new(ActionType::AssertText, "Thank you"))
        .await
        .unwrap();
    let err = exec
        .execute(&mut driver, &Action::new(ActionType::AssertText, "Out of stock"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::AssertionFailed(_)));
}

#[tokio::test]
async fn test_unknown_action_type_is_noted_not_failed() {
    let mut driver = FakeDriver::new("https://shop.test/");
    let action = Action {
        kind: ActionKind::Unknown("teleport".into()),
        target: "Mars".into(),
        value: None,
        notes: None,
    };

    let execution = executor().execute(&mut driver, &action).await.unwrap();
    assert_eq!(execution.note.as_deref(), Some("Unknown action type: teleport; skipped."));
    assert!(execution.phases.is_empty());
    assert!(driver.calls.is_empty());
}

#[tokio::test]
async fn test_press_defaults_to_enter() {
    let mut driver = FakeDriver::new("https://shop.test/");
    driver.enter_effects.push(Effect::Navigate("https://shop.test/search?q=shoes".into()));

    executor()
        .execute(&mut driver, &Action::new(ActionType::Press, ""))
        .await
        .unwrap();
    assert_eq!(driver.url, "https://shop.test/search?q=shoes");
}
