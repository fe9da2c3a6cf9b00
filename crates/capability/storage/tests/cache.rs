use iot_storage::{CacheEntry, CachePolicy, InMemoryReadingCache, ReadingCache};

fn entry(sensor_id: i64, value: f64) -> CacheEntry {
    CacheEntry {
        value,
        timestamp: "2024-01-01T00:00:00+00:00".to_string(),
        sensor_id,
        device_id: format!("DEV_{sensor_id}"),
    }
}

#[tokio::test]
async fn series_never_exceeds_cap() {
    let cache = InMemoryReadingCache::default();
    for i in 0..500 {
        cache.refresh(&entry(1, i as f64)).await.expect("refresh");
    }

    let series = cache.series(1).await.expect("series");
    assert_eq!(series.len(), 100);
    assert_eq!(series.first().map(|e| e.value), Some(499.0));
    assert_eq!(series.last().map(|e| e.value), Some(400.0));

    let latest = cache.latest(1).await.expect("latest").expect("entry");
    assert_eq!(latest.value, 499.0);
}

#[tokio::test]
async fn series_is_per_sensor() {
    let cache = InMemoryReadingCache::new(CachePolicy {
        series_cap: 3,
        ..CachePolicy::default()
    });
    cache.refresh(&entry(1, 1.0)).await.expect("refresh");
    cache.refresh(&entry(2, 2.0)).await.expect("refresh");

    assert_eq!(cache.series(1).await.expect("series").len(), 1);
    assert_eq!(cache.series(2).await.expect("series").len(), 1);
    assert!(cache.latest(3).await.expect("latest").is_none());
}

#[tokio::test]
async fn expired_entries_are_not_returned() {
    let cache = InMemoryReadingCache::new(CachePolicy {
        latest_ttl_seconds: 0,
        series_ttl_seconds: 0,
        series_cap: 10,
    });
    cache.refresh(&entry(1, 1.0)).await.expect("refresh");
    assert!(cache.latest(1).await.expect("latest").is_none());
    assert!(cache.series(1).await.expect("series").is_empty());
}

#[test]
fn cache_entry_json_layout() {
    let value = serde_json::to_value(entry(5, 21.5)).expect("json");
    assert_eq!(
        value,
        serde_json::json!({
            "value": 21.5,
            "timestamp": "2024-01-01T00:00:00+00:00",
            "sensor_id": 5,
            "device_id": "DEV_5"
        })
    );
    assert_eq!(iot_storage::latest_key(5), "sensor:5:latest");
    assert_eq!(iot_storage::series_key(5), "sensor:5:series");
}
