/// Signup selection for training days
///
/// Decides which waiting signups get a seat. The rules:
///
/// - Canceled signups are ignored; selected signups stay selected, even if
///   the capacity shrank below their number.
/// - Waiting signups are considered in order: priority first, then earliest
///   `signed_up_on`. Priority means a certain, whole-day signup made before
///   the training's priority cutoff.
/// - Up to [`ORGA_SLOTS`] seats are held back for organizers. While fewer
///   than two organizers are selected and organizers are still waiting,
///   non-organizers only get a seat if one is left after the reservation.
///
/// Every operation that can change the outcome (signing up, editing or
/// canceling a signup, changing a training's capacity or priority date)
/// runs selection again inside the same transaction, after locking the
/// training row. Concurrent requests for the same training day are
/// serialized by that lock.
///
/// # Example
///
/// ```
/// use towclub_shared::selection::{select, Candidate};
/// use towclub_shared::models::signup::SignupStatus;
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// let pilot = Candidate {
///     id: Uuid::new_v4(),
///     status: SignupStatus::Waiting,
///     is_orga: false,
///     has_priority: true,
///     signed_up_on: Utc::now(),
/// };
///
/// assert_eq!(select(&[pilot.clone()], 4), vec![pilot.id]);
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::bill::Bill;
use crate::models::signup::{CreateSignup, Signup, SignupStatus, SignupWithPilot, UpdateSignup};
use crate::models::training::{Training, UpdateTraining};

/// Seats held back for organizers on each training day
pub const ORGA_SLOTS: usize = 2;

/// A signup as seen by the selection rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: Uuid,
    pub status: SignupStatus,
    pub is_orga: bool,
    pub has_priority: bool,
    pub signed_up_on: DateTime<Utc>,
}

impl Candidate {
    pub fn from_signup(signup: &SignupWithPilot, cutoff: DateTime<Utc>) -> Self {
        Self {
            id: signup.signup.id,
            status: signup.signup.status,
            is_orga: signup.is_orga,
            has_priority: signup.signup.has_priority(cutoff),
            signed_up_on: signup.signup.signed_up_on,
        }
    }
}

/// Returns the ids of waiting candidates to promote, in promotion order
pub fn select(candidates: &[Candidate], max_pilots: usize) -> Vec<Uuid> {
    let mut selected = 0usize;
    let mut selected_orgas = 0usize;
    let mut waiting: Vec<&Candidate> = Vec::new();

    for candidate in candidates {
        match candidate.status {
            SignupStatus::Selected => {
                selected += 1;
                if candidate.is_orga {
                    selected_orgas += 1;
                }
            }
            SignupStatus::Waiting => waiting.push(candidate),
            SignupStatus::Canceled => {}
        }
    }

    waiting.sort_by(|a, b| {
        b.has_priority
            .cmp(&a.has_priority)
            .then(a.signed_up_on.cmp(&b.signed_up_on))
            .then(a.id.cmp(&b.id))
    });

    let mut waiting_orgas = waiting.iter().filter(|c| c.is_orga).count();
    let mut promoted = Vec::new();

    for candidate in waiting {
        if selected >= max_pilots {
            break;
        }

        if candidate.is_orga {
            promoted.push(candidate.id);
            selected += 1;
            selected_orgas += 1;
            waiting_orgas -= 1;
            continue;
        }

        let reserved = ORGA_SLOTS.saturating_sub(selected_orgas).min(waiting_orgas);
        if selected + reserved < max_pilots {
            promoted.push(candidate.id);
            selected += 1;
        }
    }

    promoted
}

/// Errors for signup and selection operations
#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("Training not found: {0}")]
    TrainingNotFound(Uuid),

    #[error("Signup not found: {0}")]
    SignupNotFound(Uuid),

    /// Pilots can't sign up for or change signups of past training days
    #[error("Training on {0} is in the past")]
    TrainingInPast(NaiveDate),

    #[error("Pilot is already signed up for this training")]
    AlreadySignedUp,

    /// Billed signups are settled and can't be canceled
    #[error("Signup {0} is already billed")]
    AlreadyBilled(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Runs selection for a locked training and promotes the chosen signups
///
/// The caller must hold the training's row lock (see [`Training::lock`]).
pub async fn run_selection(
    conn: &mut PgConnection,
    training: &Training,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let signups = Signup::list_by_training(&mut *conn, training.id).await?;
    let cutoff = training.priority_cutoff();
    let candidates: Vec<Candidate> = signups
        .iter()
        .map(|s| Candidate::from_signup(s, cutoff))
        .collect();

    let promoted = select(&candidates, training.capacity());
    debug!(
        training_id = %training.id,
        candidates = candidates.len(),
        promoted = promoted.len(),
        "Selection computed"
    );

    if !promoted.is_empty() {
        Signup::select_many(&mut *conn, &promoted).await?;
        info!(training_id = %training.id, date = %training.date, promoted = ?promoted, "Promoted signups");
    }

    Ok(promoted)
}

/// Runs selection for a training in its own transaction
pub async fn select_for_training(
    pool: &PgPool,
    training_id: Uuid,
) -> Result<Vec<Uuid>, SignupError> {
    let mut tx = pool.begin().await?;

    let training = Training::lock(&mut *tx, training_id)
        .await?
        .ok_or(SignupError::TrainingNotFound(training_id))?;
    let promoted = run_selection(&mut tx, &training).await?;

    tx.commit().await?;
    Ok(promoted)
}

/// Signs a pilot up for a training and runs selection
///
/// Returns the signup as it stands after selection.
///
/// # Errors
///
/// - `SignupError::TrainingInPast` if the training is before `today`
/// - `SignupError::AlreadySignedUp` if the pilot has a signup already (a
///   canceled one is reactivated through [`update_signup`])
pub async fn sign_up(
    pool: &PgPool,
    data: CreateSignup,
    today: NaiveDate,
) -> Result<Signup, SignupError> {
    let mut tx = pool.begin().await?;

    let training = Training::lock(&mut *tx, data.training_id)
        .await?
        .ok_or(SignupError::TrainingNotFound(data.training_id))?;
    if training.is_in_past(today) {
        warn!(training_id = %training.id, pilot_id = %data.pilot_id, "Rejected signup for past training");
        return Err(SignupError::TrainingInPast(training.date));
    }

    if Signup::find_by_training_and_pilot(&mut *tx, training.id, data.pilot_id)
        .await?
        .is_some()
    {
        return Err(SignupError::AlreadySignedUp);
    }

    let signup = Signup::create(&mut *tx, data).await?;
    run_selection(&mut tx, &training).await?;
    let signup = Signup::find_by_id(&mut *tx, signup.id)
        .await?
        .ok_or(SignupError::SignupNotFound(signup.id))?;

    tx.commit().await?;

    info!(
        signup_id = %signup.id,
        training_id = %training.id,
        status = signup.status.as_str(),
        "Pilot signed up"
    );
    Ok(signup)
}

/// Changes flags or comment of a signup and runs selection
///
/// Editing a canceled signup puts it back on the waiting list. Changing
/// `is_certain` or `for_whole_day`, or reactivating, moves the signup to the
/// back of the list. Organizers may edit signups of past training days.
pub async fn update_signup(
    pool: &PgPool,
    signup_id: Uuid,
    data: UpdateSignup,
    today: NaiveDate,
    acting_as_orga: bool,
) -> Result<Signup, SignupError> {
    let (mut tx, training, current) = lock_signup(pool, signup_id).await?;

    if training.is_in_past(today) && !acting_as_orga {
        return Err(SignupError::TrainingInPast(training.date));
    }

    let reactivate = current.status == SignupStatus::Canceled;
    let reset_position = reactivate || data.resets_position(&current);

    if reactivate {
        Signup::set_status(&mut *tx, signup_id, SignupStatus::Waiting, true).await?;
        info!(%signup_id, "Reactivated canceled signup");
    }
    Signup::update(&mut *tx, signup_id, data, reset_position).await?;

    run_selection(&mut tx, &training).await?;
    let signup = Signup::find_by_id(&mut *tx, signup_id)
        .await?
        .ok_or(SignupError::SignupNotFound(signup_id))?;

    tx.commit().await?;

    debug!(%signup_id, reset_position, status = signup.status.as_str(), "Updated signup");
    Ok(signup)
}

/// Cancels a signup and runs selection so the seat can be refilled
///
/// Canceling an already canceled signup is a no-op.
///
/// # Errors
///
/// - `SignupError::AlreadyBilled` if the signup has a bill
/// - `SignupError::TrainingInPast` for pilots canceling after the day
pub async fn cancel_signup(
    pool: &PgPool,
    signup_id: Uuid,
    today: NaiveDate,
    acting_as_orga: bool,
) -> Result<Signup, SignupError> {
    let (mut tx, training, current) = lock_signup(pool, signup_id).await?;

    if !current.status.can_transition_to(SignupStatus::Canceled) {
        return Ok(current);
    }
    if training.is_in_past(today) && !acting_as_orga {
        return Err(SignupError::TrainingInPast(training.date));
    }
    if Bill::exists_for_signup(&mut *tx, signup_id).await? {
        warn!(%signup_id, "Rejected cancel of billed signup");
        return Err(SignupError::AlreadyBilled(signup_id));
    }

    let signup = Signup::set_status(&mut *tx, signup_id, SignupStatus::Canceled, false)
        .await?
        .ok_or(SignupError::SignupNotFound(signup_id))?;
    let promoted = run_selection(&mut tx, &training).await?;

    tx.commit().await?;

    info!(
        %signup_id,
        training_id = %training.id,
        refilled = promoted.len(),
        "Canceled signup"
    );
    Ok(signup)
}

/// Updates a training's capacity, priority date or info and runs selection
pub async fn update_training(
    pool: &PgPool,
    training_id: Uuid,
    data: UpdateTraining,
) -> Result<(Training, Vec<Uuid>), SignupError> {
    let mut tx = pool.begin().await?;

    Training::lock(&mut *tx, training_id)
        .await?
        .ok_or(SignupError::TrainingNotFound(training_id))?;
    let training = Training::update(&mut *tx, training_id, data)
        .await?
        .ok_or(SignupError::TrainingNotFound(training_id))?;
    let promoted = run_selection(&mut tx, &training).await?;

    tx.commit().await?;

    info!(
        %training_id,
        max_pilots = training.max_pilots,
        priority_date = %training.priority_date,
        "Updated training"
    );
    Ok((training, promoted))
}

/// Opens a transaction holding the lock of the signup's training and reads
/// the signup under that lock
async fn lock_signup(
    pool: &PgPool,
    signup_id: Uuid,
) -> Result<(sqlx::Transaction<'static, sqlx::Postgres>, Training, Signup), SignupError> {
    let mut tx = pool.begin().await?;

    let training_id = Signup::find_by_id(&mut *tx, signup_id)
        .await?
        .ok_or(SignupError::SignupNotFound(signup_id))?
        .training_id;
    let training = Training::lock(&mut *tx, training_id)
        .await?
        .ok_or(SignupError::TrainingNotFound(training_id))?;
    let signup = Signup::find_by_id(&mut *tx, signup_id)
        .await?
        .ok_or(SignupError::SignupNotFound(signup_id))?;

    Ok((tx, training, signup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn candidate(status: SignupStatus, is_orga: bool, has_priority: bool, minute: i64) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            status,
            is_orga,
            has_priority,
            signed_up_on: base() + Duration::minutes(minute),
        }
    }

    fn waiting(minute: i64) -> Candidate {
        candidate(SignupStatus::Waiting, false, false, minute)
    }

    #[test]
    fn test_fills_free_seats_in_signup_order() {
        let a = waiting(1);
        let b = waiting(2);
        let c = waiting(3);

        let promoted = select(&[c.clone(), a.clone(), b.clone()], 2);
        assert_eq!(promoted, vec![a.id, b.id]);
    }

    #[test]
    fn test_priority_beats_earlier_signup() {
        let early = waiting(1);
        let prio = candidate(SignupStatus::Waiting, false, true, 50);

        let promoted = select(&[early.clone(), prio.clone()], 1);
        assert_eq!(promoted, vec![prio.id]);
    }

    #[test]
    fn test_canceled_signups_are_ignored() {
        let canceled = candidate(SignupStatus::Canceled, false, true, 0);
        let a = waiting(1);

        let promoted = select(&[canceled, a.clone()], 1);
        assert_eq!(promoted, vec![a.id]);
    }

    #[test]
    fn test_selected_are_never_demoted() {
        let selected: Vec<Candidate> = (0..5)
            .map(|m| candidate(SignupStatus::Selected, false, false, m))
            .collect();
        let mut all = selected.clone();
        all.push(waiting(10));

        // Capacity shrank below the selected count: nothing to promote, and
        // selection never returns demotions
        assert!(select(&all, 3).is_empty());
    }

    #[test]
    fn test_orga_seats_are_reserved() {
        let pilots: Vec<Candidate> = (0..4).map(waiting).collect();
        let orga = candidate(SignupStatus::Waiting, true, false, 30);

        let mut all = pilots.clone();
        all.push(orga.clone());

        // Four seats, one waiting orga: three pilots, then the orga
        let promoted = select(&all, 4);
        assert_eq!(promoted.len(), 4);
        assert!(promoted.contains(&orga.id));
        assert!(!promoted.contains(&pilots[3].id));
    }

    #[test]
    fn test_two_orgas_reserve_two_seats() {
        let pilots: Vec<Candidate> = (0..4).map(waiting).collect();
        let orga_a = candidate(SignupStatus::Waiting, true, false, 40);
        let orga_b = candidate(SignupStatus::Waiting, true, false, 41);

        let mut all = pilots.clone();
        all.push(orga_a.clone());
        all.push(orga_b.clone());

        let promoted = select(&all, 4);
        assert_eq!(promoted, vec![pilots[0].id, pilots[1].id, orga_a.id, orga_b.id]);
    }

    #[test]
    fn test_reservation_counts_selected_orgas() {
        let selected_orgas = vec![
            candidate(SignupStatus::Selected, true, false, 0),
            candidate(SignupStatus::Selected, true, false, 1),
        ];
        let late_orga = candidate(SignupStatus::Waiting, true, false, 50);
        let pilot = waiting(10);

        let mut all = selected_orgas;
        all.push(late_orga.clone());
        all.push(pilot.clone());

        // Both orga seats are taken, so the third orga competes normally
        let promoted = select(&all, 3);
        assert_eq!(promoted, vec![pilot.id]);
    }

    #[test]
    fn test_no_reservation_without_waiting_orgas() {
        let pilots: Vec<Candidate> = (0..3).map(waiting).collect();

        let promoted = select(&pilots, 3);
        assert_eq!(promoted.len(), 3);
    }

    #[test]
    fn test_orga_gets_seat_even_when_list_is_full_of_pilots() {
        let pilots: Vec<Candidate> = (0..10).map(waiting).collect();
        let orga = candidate(SignupStatus::Waiting, true, false, 99);

        let mut all = pilots;
        all.push(orga.clone());

        let promoted = select(&all, 2);
        assert_eq!(promoted.len(), 2);
        assert!(promoted.contains(&orga.id));
    }

    #[test]
    fn test_zero_capacity_promotes_nobody() {
        let orga = candidate(SignupStatus::Waiting, true, true, 0);
        assert!(select(&[orga], 0).is_empty());
    }

    #[test]
    fn test_ties_are_broken_by_id() {
        let mut a = waiting(1);
        let mut b = waiting(1);
        if b.id < a.id {
            std::mem::swap(&mut a, &mut b);
        }

        assert_eq!(select(&[b.clone(), a.clone()], 1), vec![a.id]);
    }
}
