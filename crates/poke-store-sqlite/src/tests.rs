//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeDelta, TimeZone as _, Utc};
use poke_core::{
  NewPoke, PokeStore, Record, Status, StoreError as _, TunnelType,
};

use crate::{ErrorKind, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn sms(send_in: TimeDelta, expire_in: TimeDelta) -> NewPoke {
  let now = Utc::now();
  NewPoke::new(
    TunnelType::Sms,
    "+15551234567",
    "hi",
    now + send_in,
    now + expire_in,
  )
}

fn ids(list: &[&str]) -> Vec<String> {
  list.iter().map(|s| s.to_string()).collect()
}

// ─── Create / get / update / delete ──────────────────────────────────────────

#[tokio::test]
async fn create_assigns_id_and_roundtrips() {
  let s = store().await;

  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)).with_subject("ignored"))
    .await
    .unwrap();
  assert!(!poke.id.is_empty());

  let fetched = s.get(&[poke.id.clone()]).await.unwrap();
  assert_eq!(fetched, vec![poke]);
}

#[tokio::test]
async fn create_twice_gives_distinct_ids() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  let b = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn get_preserves_input_order() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  let b = s.create(sms(TimeDelta::zero(), TimeDelta::hours(2))).await.unwrap();

  let got = s.get(&[b.id.clone(), a.id.clone()]).await.unwrap();
  assert_eq!(got[0].id, b.id);
  assert_eq!(got[1].id, a.id);
}

#[tokio::test]
async fn get_with_missing_id_fails_whole_call() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();

  let err = s.get(&[a.id.clone(), "nope".into()]).await.unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(err.op, "get");
  assert!(err.ids.contains("nope"));
  assert!(matches!(err.kind, ErrorKind::NotFound(ref id) if id == "nope"));
}

#[tokio::test]
async fn update_replaces_full_document() {
  let s = store().await;
  let mut poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)).with_subject("old"))
    .await
    .unwrap();

  poke.body = "rescheduled".into();
  poke.subject = None;
  poke.date_to_send = poke.date_to_send + TimeDelta::hours(3);
  s.update(poke.clone()).await.unwrap();

  let fetched = s.get(&[poke.id.clone()]).await.unwrap().remove(0);
  assert_eq!(fetched, poke);
}

#[tokio::test]
async fn update_missing_id_is_not_found() {
  let s = store().await;
  let poke = sms(TimeDelta::zero(), TimeDelta::hours(1)).into_poke("ghost".into());

  let err = s.update(poke).await.unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(err.op, "update");

  // Nothing was upserted.
  assert!(s.get(&ids(&["ghost"])).await.is_err());
}

#[tokio::test]
async fn delete_removes_batch() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  let b = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();

  s.delete(&[a.id.clone(), b.id.clone()]).await.unwrap();
  assert!(s.get(&[a.id]).await.unwrap_err().is_not_found());
  assert!(s.get(&[b.id]).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_is_all_or_nothing() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();

  let err = s.delete(&[a.id.clone(), "missing".into()]).await.unwrap_err();
  assert!(err.is_not_found());

  // The transaction rolled back; `a` is still queued.
  assert_eq!(s.get(&[a.id.clone()]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_tolerates_repeated_ids() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  s.delete(&[a.id.clone(), a.id.clone()]).await.unwrap();
  assert!(s.get(&[a.id]).await.is_err());
}

// ─── Selection ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_to_send_boundary_is_strict() {
  let s = store().await;
  let poke = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();

  let at = s.list_to_send_at(poke.date_to_send).await.unwrap();
  assert!(at.is_empty());

  let after = s
    .list_to_send_at(poke.date_to_send + TimeDelta::nanoseconds(1))
    .await
    .unwrap();
  assert_eq!(after.len(), 1);
  assert_eq!(after[0].id, poke.id);
}

#[tokio::test]
async fn list_expired_boundary_is_strict() {
  let s = store().await;
  let poke = s.create(sms(TimeDelta::hours(1), TimeDelta::zero())).await.unwrap();

  assert!(s.list_expired_at(poke.expiry).await.unwrap().is_empty());
  assert_eq!(
    s.list_expired_at(poke.expiry + TimeDelta::nanoseconds(1))
      .await
      .unwrap()
      .len(),
    1
  );
}

#[tokio::test]
async fn list_to_send_includes_expired() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::hours(-2), TimeDelta::hours(-1)))
    .await
    .unwrap();

  let due = s.list_to_send().await.unwrap();
  assert_eq!(due.len(), 1);
  assert_eq!(due[0].id, poke.id);
}

#[tokio::test]
async fn selection_is_capped() {
  let s = store().await;
  let at = crate::encode::encode_dt(Utc::now() - TimeDelta::hours(1)).unwrap();

  s.connection()
    .call(move |conn| {
      let tx = conn.transaction()?;
      {
        let mut stmt = tx.prepare(
          "INSERT INTO pokes (poke_id, tunnel, \"to\", body, date_to_send, expiry)
           VALUES (?1, 'sms', '+1', 'x', ?2, ?2)",
        )?;
        for i in 0..1005 {
          stmt.execute(rusqlite::params![format!("bulk-{i}"), at])?;
        }
      }
      tx.commit()?;
      Ok(())
    })
    .await
    .unwrap();

  assert_eq!(s.list_to_send().await.unwrap().len(), poke_core::LIST_LIMIT);
  assert_eq!(s.list_expired().await.unwrap().len(), poke_core::LIST_LIMIT);
}

// ─── Archive ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_moves_poke() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)))
    .await
    .unwrap();

  let archived = s.archive(&poke.id).await.unwrap();
  assert_eq!(archived.id, poke.id);
  assert_eq!(archived.tunnel, TunnelType::Sms);
  assert_eq!(archived.to, poke.to);
  assert!(!archived.expired);

  assert!(s.get(&[poke.id.clone()]).await.unwrap_err().is_not_found());
  assert_eq!(s.get_archived(&[poke.id.clone()]).await.unwrap(), vec![archived]);
}

#[tokio::test]
async fn archive_decides_expiry_at_archive_time() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-10), TimeDelta::seconds(5)))
    .await
    .unwrap();

  // Selected while still live...
  let due = s.list_to_send().await.unwrap();
  assert!(due.iter().any(|p| p.id == poke.id));

  // ...but archived after the expiry passed.
  let archived = s
    .archive_at(&poke.id, poke.expiry + TimeDelta::seconds(1))
    .await
    .unwrap();
  assert!(archived.expired);
}

#[tokio::test]
async fn archive_missing_is_not_found() {
  let s = store().await;
  let err = s.archive("nope").await.unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(err.op, "archive");
  assert_eq!(err.ids, "nope");
}

#[tokio::test]
async fn archive_failure_leaves_no_partial_state() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)))
    .await
    .unwrap();

  // Plant a conflicting archive row so the insert step fails after the read.
  let id = poke.id.clone();
  s.connection()
    .call(move |conn| {
      conn.execute(
        "INSERT INTO archived_pokes (poke_id, tunnel, \"to\", expired, archived_at)
         VALUES (?1, 'email', 'planted', 1, '2000-01-01T00:00:00.000000000Z')",
        [&id],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s.archive(&poke.id).await.unwrap_err();
  assert!(!err.is_not_found());

  // The live poke survived and the planted row is untouched.
  assert_eq!(s.get(&[poke.id.clone()]).await.unwrap(), vec![poke.clone()]);
  let archived = s.get_archived(&[poke.id.clone()]).await.unwrap();
  assert_eq!(archived[0].to, "planted");
}

#[tokio::test]
async fn delete_archived_is_all_or_nothing() {
  let s = store().await;
  let a = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  let b = s.create(sms(TimeDelta::zero(), TimeDelta::hours(1))).await.unwrap();
  s.archive(&a.id).await.unwrap();
  s.archive(&b.id).await.unwrap();

  let err = s
    .delete_archived(&[a.id.clone(), "missing".into()])
    .await
    .unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(s.get_archived(&[a.id.clone()]).await.unwrap().len(), 1);

  s.delete_archived(&[a.id.clone(), b.id.clone()]).await.unwrap();
  assert!(s.get_archived(&[a.id]).await.unwrap_err().is_not_found());
}

// ─── Claims ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn claim_excludes_other_claimants_until_lease_lapses() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)))
    .await
    .unwrap();
  let now = Utc::now();
  let lease = TimeDelta::seconds(30);

  let claimed = s.claim_at(&poke.id, "a", lease, now).await.unwrap().unwrap();
  let claim = claimed.claim.unwrap();
  assert_eq!(claim.claimed_by, "a");
  assert_eq!(claim.claimed_until, now + lease);

  assert!(s.claim_at(&poke.id, "b", lease, now).await.unwrap().is_none());
  assert!(s.claim_at(&poke.id, "a", lease, now).await.unwrap().is_some());

  let later = now + lease;
  let stolen = s.claim_at(&poke.id, "b", lease, later).await.unwrap().unwrap();
  assert_eq!(stolen.claim.unwrap().claimed_by, "b");
}

#[tokio::test]
async fn claim_missing_is_not_found() {
  let s = store().await;
  let err = s.claim("nope", "a", TimeDelta::seconds(1)).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn claim_with_unrepresentable_lease_is_refused() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)))
    .await
    .unwrap();

  let err = s.claim(&poke.id, "a", TimeDelta::MAX).await.unwrap_err();
  assert!(matches!(err.kind, ErrorKind::OutOfRange(_)));

  // Representable, but past year 9999.
  let err = s
    .claim(&poke.id, "a", TimeDelta::days(3_000_000))
    .await
    .unwrap_err();
  assert!(matches!(err.kind, ErrorKind::OutOfRange(_)));

  let stored = s.get(&[poke.id.clone()]).await.unwrap();
  assert_eq!(stored[0].claim, None);
  assert!(s.claim(&poke.id, "b", TimeDelta::minutes(5)).await.unwrap().is_some());
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_accumulate_in_timestamp_order() {
  let s = store().await;
  let now = Utc::now();

  let second = s
    .create_record(Record::new("m1", Status::Delivered, now))
    .await
    .unwrap();
  let first = s
    .create_record(Record::new("m1", Status::Queued, now - TimeDelta::seconds(5)))
    .await
    .unwrap();
  s.create_record(Record::new("m2", Status::Failed, now)).await.unwrap();

  assert!(first.is_persisted());
  assert_ne!(first.id, second.id);

  let records = s.get_records("m1").await.unwrap();
  assert_eq!(records, vec![first, second]);
}

#[tokio::test]
async fn get_records_for_unknown_message_is_empty() {
  let s = store().await;
  assert!(s.get_records("none").await.unwrap().is_empty());
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_without_send() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::hours(1), TimeDelta::hours(-1)))
    .await
    .unwrap();

  assert!(s.list_expired().await.unwrap().iter().any(|p| p.id == poke.id));
  assert!(!s.list_to_send().await.unwrap().iter().any(|p| p.id == poke.id));

  let archived = s.archive(&poke.id).await.unwrap();
  assert!(archived.expired);
}

// ─── Timestamp range ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_refuses_timestamps_past_year_9999() {
  let s = store().await;
  let now = Utc::now();
  let forever = NewPoke::new(TunnelType::Sms, "+1", "hi", now, DateTime::<Utc>::MAX_UTC);

  let err = s.create(forever).await.unwrap_err();
  assert!(matches!(err.kind, ErrorKind::OutOfRange(_)));
  assert_eq!(err.op, "create");

  // Nothing was written, so selection keeps working.
  assert!(s.list_expired().await.unwrap().is_empty());
  assert!(s.list_to_send().await.unwrap().is_empty());
}

#[tokio::test]
async fn last_representable_instant_roundtrips() {
  let s = store().await;
  let now = Utc::now();
  let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()
    + TimeDelta::nanoseconds(999_999_999);

  let poke = s
    .create(NewPoke::new(TunnelType::Sms, "+1", "hi", now - TimeDelta::seconds(1), last))
    .await
    .unwrap();

  assert!(s.list_expired().await.unwrap().is_empty());
  assert_eq!(s.list_to_send().await.unwrap(), vec![poke.clone()]);
  assert_eq!(s.get(&[poke.id.clone()]).await.unwrap(), vec![poke]);
}

#[tokio::test]
async fn update_refuses_timestamps_past_year_9999() {
  let s = store().await;
  let poke = s
    .create(sms(TimeDelta::seconds(-1), TimeDelta::hours(1)))
    .await
    .unwrap();

  let mut changed = poke.clone();
  changed.expiry = DateTime::<Utc>::MAX_UTC;
  let err = s.update(changed).await.unwrap_err();
  assert!(matches!(err.kind, ErrorKind::OutOfRange(_)));

  assert_eq!(s.get(&[poke.id.clone()]).await.unwrap(), vec![poke]);
}

#[tokio::test]
async fn record_refuses_timestamps_past_year_9999() {
  let s = store().await;
  let err = s
    .create_record(Record::new("m1", Status::Queued, DateTime::<Utc>::MAX_UTC))
    .await
    .unwrap_err();
  assert!(matches!(err.kind, ErrorKind::OutOfRange(_)));
  assert!(s.get_records("m1").await.unwrap().is_empty());
}
