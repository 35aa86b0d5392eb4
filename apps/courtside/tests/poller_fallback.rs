mod common;

use std::time::Duration;

use time::macros::datetime;

use common::{activity, harness, notification};
use courtside_sync::cache::{ActivityFeed, CacheValue, QueryKey};
use courtside_sync::model::ActivityPage;

#[test_timeout::tokio_timeout_test(10)]
async fn offline_poll_merges_oldest_first() {
    let h = harness();
    {
        let mut server = h.api.server.lock();
        server.notifications = vec![
            notification("N3", false),
            notification("N2", false),
            notification("N1", false),
        ];
        server.activity.insert(
            "L1".into(),
            vec![ActivityPage {
                items: vec![
                    activity("e3", "L1", datetime!(2026-05-10 12:00 UTC)),
                    activity("e2", "L1", datetime!(2026-05-10 11:00 UTC)),
                ],
                next_cursor: None,
            }],
        );
    }
    {
        let cache = h.session.cache();
        let mut cache = cache.lock();
        cache.set(
            QueryKey::notification_list(),
            CacheValue::Notifications(vec![notification("N1", false)]),
        );
        cache.set(QueryKey::unread_count(), CacheValue::UnreadCount(1));
        cache.set(
            QueryKey::league_activity("L1", 20),
            CacheValue::ActivityFeed(ActivityFeed::from_pages([ActivityPage {
                items: vec![activity("e1", "L1", datetime!(2026-05-10 10:00 UTC))],
                next_cursor: None,
            }])),
        );
    }
    h.session.subscribe_league("L1");

    let report = h.session.poll_once().await;
    assert!(report.pulled);
    assert_eq!(report.merged, 4);
    assert_eq!(report.failed, 0);

    let cache = h.session.cache();
    let cache = cache.lock();
    let list: Vec<&str> = cache
        .notifications()
        .expect("list")
        .iter()
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(list, ["N3", "N2", "N1"]);
    assert_eq!(cache.unread_count(), Some(3));
    let feed = cache
        .activity_feed(&QueryKey::league_activity("L1", 20))
        .expect("feed");
    let events: Vec<&str> = feed.pages[0].items.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(events, ["e3", "e2", "e1"]);
    assert!(h
        .api
        .calls()
        .contains(&"league_activity L1 limit=20 cursor=-".to_string()));
}

#[test_timeout::tokio_timeout_test(10)]
async fn failed_refetch_stays_stale_for_next_tick() {
    let h = harness();
    h.session.cache().lock().invalidate(&QueryKey::favorites());
    h.api.fail("list_favorites");
    h.api.fail("league_activity");
    h.session.subscribe_league("L4");

    let report = h.session.poll_once().await;
    assert_eq!(report.failed, 2);
    assert!(h.session.cache().lock().is_stale(&QueryKey::favorites()));

    h.api.recover("list_favorites");
    h.api.recover("league_activity");
    let report = h.session.poll_once().await;
    assert_eq!(report.failed, 0);
    assert_eq!(report.refreshed, 1);
    let cache = h.session.cache();
    let cache = cache.lock();
    assert!(!cache.is_stale(&QueryKey::favorites()));
    assert!(cache.favorites().expect("cached").is_empty());
}

#[test_timeout::tokio_timeout_test(300, paused)]
async fn polling_runs_on_interval_until_dispose() {
    let h = harness();
    assert!(h.session.start_polling(Duration::from_secs(15)));
    assert!(!h.session.start_polling(Duration::from_secs(15)));

    tokio::time::sleep(Duration::from_secs(31)).await;
    let pulls = |h: &common::Harness| {
        h.api
            .calls()
            .iter()
            .filter(|call| call.as_str() == "list_notifications")
            .count()
    };
    assert_eq!(pulls(&h), 3, "ticks at 0s, 15s and 30s");

    h.session.dispose().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(pulls(&h), 3);
    assert!(!h.session.start_polling(Duration::from_secs(15)));
}

#[test_timeout::tokio_timeout_test(10)]
async fn load_more_appends_deduplicated_pages() {
    let h = harness();
    h.api.server.lock().activity.insert(
        "L1".into(),
        vec![
            ActivityPage {
                items: vec![
                    activity("e4", "L1", datetime!(2026-05-10 14:00 UTC)),
                    activity("e3", "L1", datetime!(2026-05-10 13:00 UTC)),
                ],
                next_cursor: Some("1".into()),
            },
            ActivityPage {
                items: vec![
                    activity("e3", "L1", datetime!(2026-05-10 13:00 UTC)),
                    activity("e2", "L1", datetime!(2026-05-10 12:00 UTC)),
                ],
                next_cursor: None,
            },
        ],
    );

    h.session.load_league_activity("L1").await.expect("first page");
    assert!(h.session.load_more_activity("L1").await.expect("second page"));
    assert!(!h.session.load_more_activity("L1").await.expect("exhausted"));

    let feed = h.session.activity_feed("L1").expect("cached");
    assert_eq!(feed.pages.len(), 2);
    let second: Vec<&str> = feed.pages[1].items.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(second, ["e2"]);
    assert!(h
        .api
        .calls()
        .contains(&"league_activity L1 limit=20 cursor=1".to_string()));
}
