/// End-to-end tests of a training day against PostgreSQL: selection,
/// runs, purchases, bills and the report ledger
///
/// Run with: cargo test --test club_day_tests -- --ignored

mod common;

use chrono::{Days, NaiveDate};
use common::{create_pilot, create_training, create_training_on, setup_pool, today, unique_date};
use sqlx::PgPool;
use std::time::Duration;
use towclub_shared::billing::{self, BillingError, PriceList};
use towclub_shared::ledger::ReportSummary;
use towclub_shared::models::absorption::{Absorption, AbsorptionError, CreateAbsorption};
use towclub_shared::models::bill::{Bill, NewBill, PaymentMethod};
use towclub_shared::models::expense::{CreateExpense, Expense};
use towclub_shared::models::pilot::Pilot;
use towclub_shared::models::purchase::{CreatePurchase, Purchase, PurchaseError, PurchaseItem};
use towclub_shared::models::report::{CreateReport, Report, ReportError, UpdateReport};
use towclub_shared::models::run::{Run, RunEntry, RunError, RunKind};
use towclub_shared::models::signup::{CreateSignup, Signup, SignupStatus, UpdateSignup};
use towclub_shared::models::training::UpdateTraining;
use towclub_shared::selection::{self, SignupError};
use uuid::Uuid;

async fn sign_up(pool: &PgPool, training_id: Uuid, pilot_id: Uuid) -> Signup {
    sign_up_with(pool, training_id, pilot_id, true).await
}

async fn sign_up_with(pool: &PgPool, training_id: Uuid, pilot_id: Uuid, is_certain: bool) -> Signup {
    selection::sign_up(
        pool,
        CreateSignup {
            training_id,
            pilot_id,
            is_certain,
            for_whole_day: true,
            comment: String::new(),
        },
        today(),
    )
    .await
    .expect("Failed to sign up")
}

async fn open_report(pool: &PgPool, training_id: Uuid) -> Report {
    Report::create(
        pool,
        CreateReport {
            training_id,
            cash_at_start: Some(0),
            remarks: String::new(),
        },
    )
    .await
    .expect("Failed to create report")
}

/// Records `flights` rotations for a signup that flies alone
async fn fly(pool: &PgPool, training_id: Uuid, signup_id: Uuid, flights: usize) {
    for _ in 0..flights {
        Run::record_rotation(
            pool,
            training_id,
            1,
            &[RunEntry {
                signup_id,
                kind: RunKind::Flight,
            }],
        )
        .await
        .expect("Failed to record flight");
    }
}

async fn prepaid_of(pool: &PgPool, pilot_id: Uuid) -> i32 {
    Pilot::find_by_id(pool, pilot_id)
        .await
        .unwrap()
        .expect("Pilot vanished")
        .prepaid_flights
}

async fn status_of(pool: &PgPool, signup_id: Uuid) -> SignupStatus {
    Signup::find_by_id(pool, signup_id)
        .await
        .unwrap()
        .expect("Signup vanished")
        .status
}

#[tokio::test]
#[ignore]
async fn test_signups_fill_capacity_then_wait() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 2).await;

    let mut signups = Vec::new();
    for _ in 0..3 {
        let pilot = create_pilot(&pool, false, true).await;
        signups.push(sign_up(&pool, training.id, pilot.id).await);
    }

    assert_eq!(signups[0].status, SignupStatus::Selected);
    assert_eq!(signups[1].status, SignupStatus::Selected);
    assert_eq!(signups[2].status, SignupStatus::Waiting);

    // The freed seat goes to the waiting pilot
    let canceled = selection::cancel_signup(&pool, signups[0].id, today(), false)
        .await
        .unwrap();
    assert_eq!(canceled.status, SignupStatus::Canceled);
    assert_eq!(status_of(&pool, signups[2].id).await, SignupStatus::Selected);

    // Canceling twice is a no-op
    let again = selection::cancel_signup(&pool, signups[0].id, today(), false)
        .await
        .unwrap();
    assert_eq!(again.status, SignupStatus::Canceled);
}

#[tokio::test]
#[ignore]
async fn test_capacity_increase_holds_seats_for_orgas() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 0).await;

    let mut pilots = Vec::new();
    for _ in 0..3 {
        let pilot = create_pilot(&pool, false, true).await;
        pilots.push(sign_up(&pool, training.id, pilot.id).await);
    }
    let orga = create_pilot(&pool, true, true).await;
    let orga_signup = sign_up(&pool, training.id, orga.id).await;
    assert_eq!(orga_signup.status, SignupStatus::Waiting);

    let (training, promoted) = selection::update_training(
        &pool,
        training.id,
        UpdateTraining {
            max_pilots: Some(3),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(training.max_pilots, 3);
    assert_eq!(promoted.len(), 3);
    assert!(promoted.contains(&orga_signup.id));
    assert_eq!(status_of(&pool, pilots[0].id).await, SignupStatus::Selected);
    assert_eq!(status_of(&pool, pilots[1].id).await, SignupStatus::Selected);
    assert_eq!(status_of(&pool, pilots[2].id).await, SignupStatus::Waiting);

    // Shrinking never demotes
    let (_, promoted) = selection::update_training(
        &pool,
        training.id,
        UpdateTraining {
            max_pilots: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(promoted.is_empty());
    assert_eq!(status_of(&pool, orga_signup.id).await, SignupStatus::Selected);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_and_past_signups_are_rejected() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 5).await;
    let pilot = create_pilot(&pool, false, true).await;

    let signup = sign_up(&pool, training.id, pilot.id).await;

    let duplicate = selection::sign_up(
        &pool,
        CreateSignup {
            training_id: training.id,
            pilot_id: pilot.id,
            is_certain: false,
            for_whole_day: false,
            comment: String::new(),
        },
        today(),
    )
    .await;
    assert!(matches!(duplicate, Err(SignupError::AlreadySignedUp)));

    let after_the_day = training.date.succ_opt().unwrap();
    let late = selection::update_signup(
        &pool,
        signup.id,
        UpdateSignup {
            comment: Some("late".to_string()),
            ..Default::default()
        },
        after_the_day,
        false,
    )
    .await;
    assert!(matches!(late, Err(SignupError::TrainingInPast(_))));

    // Organizers may still fix it up
    let fixed = selection::update_signup(
        &pool,
        signup.id,
        UpdateSignup {
            comment: Some("late".to_string()),
            ..Default::default()
        },
        after_the_day,
        true,
    )
    .await
    .unwrap();
    assert_eq!(fixed.comment, "late");
}

#[tokio::test]
#[ignore]
async fn test_resignup_after_cancel_goes_to_the_back() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 1).await;
    let first = create_pilot(&pool, false, true).await;
    let second = create_pilot(&pool, false, true).await;

    let first_signup = sign_up(&pool, training.id, first.id).await;
    let second_signup = sign_up(&pool, training.id, second.id).await;
    assert_eq!(second_signup.status, SignupStatus::Waiting);

    selection::cancel_signup(&pool, first_signup.id, today(), false)
        .await
        .unwrap();
    assert_eq!(status_of(&pool, second_signup.id).await, SignupStatus::Selected);

    let back = selection::update_signup(&pool, first_signup.id, UpdateSignup::default(), today(), false)
        .await
        .unwrap();
    assert_eq!(back.status, SignupStatus::Waiting);
    assert!(back.signed_up_on > first_signup.signed_up_on);
}

#[tokio::test]
#[ignore]
async fn test_training_day_billing_and_ledger() {
    let pool = setup_pool().await;
    let prices = PriceList::default();
    let training = create_training(&pool, 4).await;

    let guest = create_pilot(&pool, false, false).await;
    let orga = create_pilot(&pool, true, true).await;
    let guest_signup = sign_up(&pool, training.id, guest.id).await;
    let orga_signup = sign_up(&pool, training.id, orga.id).await;

    let report = Report::create(
        &pool,
        CreateReport {
            training_id: training.id,
            cash_at_start: Some(100),
            remarks: String::new(),
        },
    )
    .await
    .unwrap();
    let designate = |cash_at_end| UpdateReport {
        cash_at_start: 100,
        cash_at_end,
        remarks: String::new(),
        orga_1: Some(orga_signup.id),
        orga_2: None,
    };
    Report::update(&pool, report.id, designate(None)).await.unwrap();

    // Two prepaid flights for 18
    Purchase::create(
        &pool,
        report.id,
        CreatePurchase {
            signup_id: guest_signup.id,
            item: PurchaseItem::PrepaidFlights,
            description: "Bundle of 2".to_string(),
            price: 18,
            quantity: 2,
        },
    )
    .await
    .unwrap();

    let orga_kinds = [RunKind::Bus, RunKind::Flight, RunKind::Boat, RunKind::Break];
    for orga_kind in orga_kinds {
        Run::record_rotation(
            &pool,
            training.id,
            2,
            &[
                RunEntry {
                    signup_id: guest_signup.id,
                    kind: RunKind::Flight,
                },
                RunEntry {
                    signup_id: orga_signup.id,
                    kind: orga_kind,
                },
            ],
        )
        .await
        .unwrap();
    }

    // Guest: 4 flights, 2 prepaid, bundle 18, day pass 20 for the 4th flight
    let preview = billing::preview(&pool, report.id, guest_signup.id, &prices)
        .await
        .unwrap();
    assert!(preview.day_pass_added);
    assert_eq!(preview.breakdown.prepaid_used, 2);
    assert_eq!(preview.breakdown.amount, 2 * 9 + 18 + 20);

    let (guest_bill, _) =
        billing::settle(&pool, report.id, guest_signup.id, PaymentMethod::Cash, &prices)
            .await
            .unwrap();
    assert_eq!(guest_bill.amount, 56);
    assert_eq!(guest_bill.prepaid_flights, 2);
    let guest_after = Pilot::find_by_id(&pool, guest.id).await.unwrap().unwrap();
    assert_eq!(guest_after.prepaid_flights, 0);

    // Orga of the day: 1 flight, 2 services of which one is free
    let (orga_bill, orga_preview) =
        billing::settle(&pool, report.id, orga_signup.id, PaymentMethod::Bank, &prices)
            .await
            .unwrap();
    assert!(!orga_preview.day_pass_added);
    assert_eq!(orga_preview.breakdown.charged_services, 1);
    assert_eq!(orga_bill.amount, 9 + 3);

    let twice = billing::settle(&pool, report.id, orga_signup.id, PaymentMethod::Cash, &prices).await;
    assert!(matches!(twice, Err(BillingError::AlreadyBilled(_))));

    Expense::create(
        &pool,
        report.id,
        CreateExpense {
            reason: "Fuel".to_string(),
            amount: 10,
        },
    )
    .await
    .unwrap();
    Absorption::create(
        &pool,
        report.id,
        CreateAbsorption {
            signup_id: None,
            reason: "Donation".to_string(),
            amount: 5,
        },
    )
    .await
    .unwrap();
    Report::update(&pool, report.id, designate(Some(150))).await.unwrap();

    let summary = ReportSummary::load(&pool, report.id).await.unwrap().unwrap();
    assert_eq!(summary.ledger.cash_bills, 56);
    assert_eq!(summary.ledger.bank_bills, 12);
    assert_eq!(summary.ledger.revenue, 68);
    assert_eq!(summary.ledger.expected_cash_at_end, 100 + 56 + 5 - 10);
    assert_eq!(summary.ledger.difference, Some(-1));
    assert_eq!(summary.ledger.flights, 5);
    assert_eq!(summary.ledger.services, 2);

    // Billed signups are frozen
    let run_after_bill = Run::record_rotation(
        &pool,
        training.id,
        0,
        &[RunEntry {
            signup_id: guest_signup.id,
            kind: RunKind::Flight,
        }],
    )
    .await;
    assert!(matches!(run_after_bill, Err(RunError::AlreadyBilled(_))));
    let cancel = selection::cancel_signup(&pool, guest_signup.id, today(), true).await;
    assert!(matches!(cancel, Err(SignupError::AlreadyBilled(_))));

    // Deleting the bill gives the prepaid flights back
    Bill::delete(&pool, guest_bill.id).await.unwrap().unwrap();
    let guest_after = Pilot::find_by_id(&pool, guest.id).await.unwrap().unwrap();
    assert_eq!(guest_after.prepaid_flights, 2);
}

#[tokio::test]
#[ignore]
async fn test_rotation_rejects_stale_participants() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 4).await;
    let first = create_pilot(&pool, false, true).await;
    let second = create_pilot(&pool, false, true).await;
    let first_signup = sign_up(&pool, training.id, first.id).await;
    sign_up(&pool, training.id, second.id).await;

    let result = Run::record_rotation(
        &pool,
        training.id,
        1,
        &[RunEntry {
            signup_id: first_signup.id,
            kind: RunKind::Flight,
        }],
    )
    .await;

    assert!(matches!(
        result,
        Err(RunError::ParticipantsChanged {
            expected: 1,
            actual: 2
        })
    ));
    assert!(Run::list_by_signup(&pool, first_signup.id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_report_rules() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 4).await;
    let other_training = create_training(&pool, 4).await;
    let pilot = create_pilot(&pool, true, true).await;
    let own = sign_up(&pool, training.id, pilot.id).await;
    let foreign = sign_up(&pool, other_training.id, pilot.id).await;

    let report = Report::create(
        &pool,
        CreateReport {
            training_id: training.id,
            cash_at_start: Some(40),
            remarks: String::new(),
        },
    )
    .await
    .unwrap();

    let duplicate = Report::update(
        &pool,
        report.id,
        UpdateReport {
            cash_at_start: 40,
            orga_1: Some(own.id),
            orga_2: Some(own.id),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(duplicate, Err(ReportError::DuplicateOrga)));

    let wrong_day = Report::update(
        &pool,
        report.id,
        UpdateReport {
            cash_at_start: 40,
            orga_1: Some(foreign.id),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(wrong_day, Err(ReportError::OrgaNotInTraining(_))));

    // A purchase for a signup of another day is refused
    let purchase = Purchase::create(
        &pool,
        report.id,
        CreatePurchase {
            signup_id: foreign.id,
            item: PurchaseItem::Equipment,
            description: "Helmet".to_string(),
            price: 5,
            quantity: 0,
        },
    )
    .await;
    assert!(matches!(purchase, Err(PurchaseError::SignupNotInTraining(_))));

    // Same for an absorption naming a signup of another day
    let absorption = Absorption::create(
        &pool,
        report.id,
        CreateAbsorption {
            signup_id: Some(foreign.id),
            reason: "Old debt".to_string(),
            amount: 10,
        },
    )
    .await;
    assert!(matches!(absorption, Err(AbsorptionError::SignupNotInTraining(_))));

    let absorption = Absorption::create(
        &pool,
        report.id,
        CreateAbsorption {
            signup_id: Some(own.id),
            reason: "Old debt".to_string(),
            amount: 10,
        },
    )
    .await
    .unwrap();
    assert_eq!(absorption.signup_id, Some(own.id));
}

#[tokio::test]
#[ignore]
async fn test_priority_follows_the_priority_date() {
    let pool = setup_pool().await;

    // Default cutoff is a week before a far-future day: certain signups win
    let ahead = create_training(&pool, 0).await;
    let unsure = create_pilot(&pool, false, true).await;
    let certain = create_pilot(&pool, false, true).await;
    sign_up_with(&pool, ahead.id, unsure.id, false).await;
    let certain_signup = sign_up_with(&pool, ahead.id, certain.id, true).await;

    let (_, promoted) = selection::update_training(
        &pool,
        ahead.id,
        UpdateTraining {
            max_pilots: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(promoted, vec![certain_signup.id]);

    // Cutoff long past: nobody has priority, the earlier signup wins
    let passed = create_training_on(&pool, unique_date(), 0, NaiveDate::from_ymd_opt(2000, 1, 1)).await;
    let unsure = create_pilot(&pool, false, true).await;
    let certain = create_pilot(&pool, false, true).await;
    let unsure_signup = sign_up_with(&pool, passed.id, unsure.id, false).await;
    sign_up_with(&pool, passed.id, certain.id, true).await;

    let (_, promoted) = selection::update_training(
        &pool,
        passed.id,
        UpdateTraining {
            max_pilots: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(promoted, vec![unsure_signup.id]);
}

#[tokio::test]
#[ignore]
async fn test_day_pass_counts_flights_inside_the_window_only() {
    let pool = setup_pool().await;
    let prices = PriceList {
        day_pass_period_days: 30,
        ..PriceList::default()
    };
    let date = unique_date();
    let guest = create_pilot(&pool, false, false).await;

    let outside = create_training_on(&pool, date.checked_sub_days(Days::new(31)).unwrap(), 4, None).await;
    let outside_signup = sign_up(&pool, outside.id, guest.id).await;
    fly(&pool, outside.id, outside_signup.id, 3).await;

    let training = create_training_on(&pool, date, 4, None).await;
    let signup = sign_up(&pool, training.id, guest.id).await;
    fly(&pool, training.id, signup.id, 1).await;
    let report = open_report(&pool, training.id).await;

    let preview = billing::preview(&pool, report.id, signup.id, &prices)
        .await
        .unwrap();
    assert!(!preview.day_pass_added);

    // The first day of the window counts
    let inside = create_training_on(&pool, date.checked_sub_days(Days::new(30)).unwrap(), 4, None).await;
    let inside_signup = sign_up(&pool, inside.id, guest.id).await;
    fly(&pool, inside.id, inside_signup.id, 3).await;

    let preview = billing::preview(&pool, report.id, signup.id, &prices)
        .await
        .unwrap();
    assert!(preview.day_pass_added);
    assert_eq!(preview.breakdown.purchases_cost, prices.day_pass_price);
}

#[tokio::test]
#[ignore]
async fn test_deleting_prepaid_bundle_takes_flights_back() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 4).await;
    let pilot = create_pilot(&pool, false, true).await;
    let signup = sign_up(&pool, training.id, pilot.id).await;
    let report = open_report(&pool, training.id).await;

    let bundle = |quantity: i32| CreatePurchase {
        signup_id: signup.id,
        item: PurchaseItem::PrepaidFlights,
        description: format!("Bundle of {quantity}"),
        price: 9 * quantity,
        quantity,
    };

    let first = Purchase::create(&pool, report.id, bundle(3)).await.unwrap();
    assert_eq!(prepaid_of(&pool, pilot.id).await, 3);

    Purchase::delete(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(prepaid_of(&pool, pilot.id).await, 0);
    assert!(Purchase::delete(&pool, first.id).await.unwrap().is_none());

    let second = Purchase::create(&pool, report.id, bundle(3)).await.unwrap();
    // Two of the flights were used on another day
    Pilot::adjust_prepaid_flights(&pool, pilot.id, -2).await.unwrap();

    let result = Purchase::delete(&pool, second.id).await;
    assert!(matches!(
        result,
        Err(PurchaseError::InsufficientPrepaid {
            balance: 1,
            quantity: 3
        })
    ));
    assert_eq!(prepaid_of(&pool, pilot.id).await, 1);
    assert!(Purchase::find_by_id(&pool, second.id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn test_settlement_holds_back_rotations_until_the_bill_is_stored() {
    let pool = setup_pool().await;
    let training = create_training(&pool, 4).await;
    let pilot = create_pilot(&pool, false, true).await;
    let signup = sign_up(&pool, training.id, pilot.id).await;
    let report = open_report(&pool, training.id).await;
    fly(&pool, training.id, signup.id, 1).await;

    // An uncommitted bill row parks the settlement at its insert
    let mut blocker = pool.begin().await.unwrap();
    Bill::insert(
        &mut *blocker,
        NewBill {
            signup_id: signup.id,
            report_id: report.id,
            prepaid_flights: 0,
            amount: 0,
            method: PaymentMethod::Cash,
        },
    )
    .await
    .unwrap();

    let settling = tokio::spawn({
        let pool = pool.clone();
        let (report_id, signup_id) = (report.id, signup.id);
        async move {
            billing::settle(&pool, report_id, signup_id, PaymentMethod::Cash, &PriceList::default())
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let rotating = tokio::spawn({
        let pool = pool.clone();
        let (training_id, signup_id) = (training.id, signup.id);
        async move {
            Run::record_rotation(
                &pool,
                training_id,
                1,
                &[RunEntry {
                    signup_id,
                    kind: RunKind::Flight,
                }],
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!rotating.is_finished(), "rotation ran while the bill was being written");

    blocker.rollback().await.unwrap();

    let (bill, preview) = settling.await.unwrap().unwrap();
    let rotation = rotating.await.unwrap();
    assert!(matches!(rotation, Err(RunError::AlreadyBilled(id)) if id == signup.id));

    // The bill covers every run of the signup
    let runs = Run::list_by_signup(&pool, signup.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(preview.breakdown.flights, 1);
    assert_eq!(bill.amount, 9);
}
