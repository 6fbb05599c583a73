//! Social-media mention stream source.
//!
//! Holds one long-lived streaming HTTP connection open for a fixed
//! wall-clock duration and parses each newline-delimited JSON item into a
//! [`MentionRecord`] when its text mentions a CVE id. The deadline is
//! checked inline on every received chunk; there is no timer task. Raw
//! records are folded into per-CVE [`MentionAggregate`]s by
//! [`aggregate_mentions`].

use super::FeedSource;
use crate::error::{FeedError, Result};
use crate::models::{MentionAggregate, MentionRecord};
use async_trait::async_trait;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

static CVE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").unwrap());

pub struct MentionStreamSource {
    client: ClientWithMiddleware,
    stream_url: String,
    bearer_token: String,
    duration: Duration,
}

impl MentionStreamSource {
    pub fn new(
        stream_url: impl Into<String>,
        bearer_token: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            client: super::http_client(),
            stream_url: stream_url.into(),
            bearer_token: bearer_token.into(),
            duration,
        }
    }
}

#[async_trait]
impl FeedSource for MentionStreamSource {
    type Record = MentionRecord;

    async fn fetch(&self) -> Result<Vec<MentionRecord>> {
        let deadline = Instant::now() + self.duration;

        let response = self
            .client
            .get(&self.stream_url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FeedError::fetch(
                "Mentions",
                format!("HTTP {} for stream", response.status()),
            ));
        }

        let mut records = Vec::new();
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if Instant::now() >= deadline {
                debug!("Stream duration elapsed, disconnecting");
                break;
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    // keep whatever came through before the connection dropped
                    warn!("Mention stream interrupted: {}", err);
                    break;
                }
            };

            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                // blank lines are stream keep-alives
                if line.is_empty() {
                    continue;
                }
                match parse_item(line) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(err) => warn!("Skipping malformed stream item: {}", err),
                }
            }
        }

        // the connection may end without a trailing newline
        let tail = String::from_utf8_lossy(&buffer);
        let tail = tail.trim();
        if !tail.is_empty() {
            match parse_item(tail) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => warn!("Skipping malformed stream item: {}", err),
            }
        }

        info!("Mentions: {} raw records collected", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "Mentions"
    }
}

/// Parse one stream line; `Ok(None)` when the item mentions no CVE.
fn parse_item(line: &str) -> Result<Option<MentionRecord>> {
    let payload: StreamPayload = serde_json::from_str(line)?;
    let Some(data) = payload.data else {
        return Ok(None);
    };
    let Some(cve_id) = CVE_REGEX.find(&data.text).map(|m| m.as_str().to_string()) else {
        return Ok(None);
    };

    let includes = payload.includes.unwrap_or_default();
    let follower_count = |author_id: &str| {
        includes
            .users
            .iter()
            .find(|u| u.id == author_id)
            .map(|u| u.public_metrics.followers_count)
    };

    let original = data
        .referenced_tweets
        .iter()
        .find(|r| r.kind == "retweeted")
        .and_then(|r| includes.tweets.iter().find(|t| t.id == r.id));

    Ok(Some(MentionRecord {
        cve_id,
        published_date: data.created_at,
        lang: data.lang,
        post_id: data.id,
        retweet_count: data.public_metrics.retweet_count,
        author_followers: follower_count(&data.author_id).unwrap_or(0),
        author_id: data.author_id,
        original_post_id: original.map(|t| t.id.clone()),
        original_retweet_count: original.map(|t| t.public_metrics.retweet_count),
        original_author_id: original.map(|t| t.author_id.clone()),
        original_author_followers: original.and_then(|t| follower_count(&t.author_id)),
        attack_type: data.attack_type,
    }))
}

#[derive(Default)]
struct Accumulator {
    latest_mention_date: String,
    languages: BTreeSet<String>,
    /// Distinct posts; a repost is keyed by its original's id.
    post_ids: HashSet<String>,
    /// Max retweet count seen per original post.
    retweets_by_post: HashMap<String, u64>,
    /// First follower count seen per author.
    audience_by_author: HashMap<String, u64>,
    attack_type: Option<String>,
}

impl Accumulator {
    fn fold(&mut self, record: &MentionRecord) {
        if record.published_date > self.latest_mention_date {
            self.latest_mention_date = record.published_date.clone();
        }
        self.languages.insert(record.lang.clone());

        // a repost counts toward its original post, once
        let post_key = record
            .original_post_id
            .clone()
            .unwrap_or_else(|| record.post_id.clone());
        let retweets = record
            .original_retweet_count
            .unwrap_or(record.retweet_count);
        self.post_ids.insert(post_key.clone());
        let max_seen = self.retweets_by_post.entry(post_key).or_insert(0);
        *max_seen = (*max_seen).max(retweets);

        self.audience_by_author
            .entry(record.author_id.clone())
            .or_insert(record.author_followers);
        if let (Some(author_id), Some(followers)) = (
            record.original_author_id.clone(),
            record.original_author_followers,
        ) {
            self.audience_by_author.entry(author_id).or_insert(followers);
        }

        if record.attack_type.is_some() {
            self.attack_type = record.attack_type.clone();
        }
    }

    fn finish(self, cve_id: String) -> MentionAggregate {
        MentionAggregate {
            cve_id,
            latest_mention_date: self.latest_mention_date,
            languages: self.languages,
            mention_count: self.post_ids.len() as u64,
            total_engagement: self.retweets_by_post.values().sum(),
            total_audience: self.audience_by_author.values().sum(),
            attack_type: self.attack_type,
        }
    }
}

/// Fold raw mention records into one aggregate per CVE id.
pub fn aggregate_mentions(records: &[MentionRecord]) -> Vec<MentionAggregate> {
    let mut grouped: BTreeMap<String, Accumulator> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.cve_id.clone())
            .or_default()
            .fold(record);
    }

    grouped
        .into_iter()
        .map(|(cve_id, acc)| acc.finish(cve_id))
        .collect()
}

#[derive(Deserialize)]
struct StreamPayload {
    data: Option<StreamTweet>,
    includes: Option<StreamIncludes>,
}

#[derive(Deserialize)]
struct StreamTweet {
    id: String,
    text: String,
    created_at: String,
    #[serde(default)]
    lang: String,
    author_id: String,
    #[serde(default)]
    public_metrics: TweetMetrics,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
    #[serde(default)]
    attack_type: Option<String>,
}

#[derive(Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    retweet_count: u64,
}

#[derive(Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Default, Deserialize)]
struct StreamIncludes {
    #[serde(default)]
    users: Vec<StreamUser>,
    #[serde(default)]
    tweets: Vec<StreamTweet>,
}

#[derive(Deserialize)]
struct StreamUser {
    id: String,
    #[serde(default)]
    public_metrics: UserMetrics,
}

#[derive(Default, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mention(cve_id: &str, post_id: &str, author_id: &str) -> MentionRecord {
        MentionRecord {
            cve_id: cve_id.to_string(),
            published_date: "2021-12-10T12:00:00.000Z".to_string(),
            lang: "en".to_string(),
            post_id: post_id.to_string(),
            retweet_count: 0,
            author_id: author_id.to_string(),
            author_followers: 100,
            original_post_id: None,
            original_retweet_count: None,
            original_author_id: None,
            original_author_followers: None,
            attack_type: None,
        }
    }

    #[test]
    fn test_aggregate_counts_reposts_once() {
        let original = mention("CVE-2021-44228", "1", "alice");
        let mut repost_a = mention("CVE-2021-44228", "2", "bob");
        repost_a.original_post_id = Some("1".to_string());
        repost_a.original_retweet_count = Some(40);
        repost_a.original_author_id = Some("alice".to_string());
        repost_a.original_author_followers = Some(100);
        let mut repost_b = mention("CVE-2021-44228", "3", "carol");
        repost_b.original_post_id = Some("1".to_string());
        repost_b.original_retweet_count = Some(55);
        repost_b.original_author_id = Some("alice".to_string());
        repost_b.original_author_followers = Some(100);

        let aggregates = aggregate_mentions(&[original, repost_a, repost_b]);
        assert_eq!(aggregates.len(), 1);

        let agg = &aggregates[0];
        // all three items resolve to the same original post
        assert_eq!(agg.mention_count, 1);
        // engagement takes the max retweet count per original
        assert_eq!(agg.total_engagement, 55);
        // alice, bob and carol each counted once
        assert_eq!(agg.total_audience, 300);
    }

    #[test]
    fn test_aggregate_audience_first_value_wins() {
        let mut first = mention("CVE-2021-3156", "1", "alice");
        first.author_followers = 500;
        let mut second = mention("CVE-2021-3156", "2", "alice");
        second.author_followers = 900;

        let aggregates = aggregate_mentions(&[first, second]);
        assert_eq!(aggregates[0].total_audience, 500);
        assert_eq!(aggregates[0].mention_count, 2);
    }

    #[test]
    fn test_aggregate_merges_dates_languages_and_attack_type() {
        let mut first = mention("CVE-2021-3156", "1", "alice");
        first.published_date = "2021-12-11T08:00:00.000Z".to_string();
        first.attack_type = Some("rce".to_string());
        let mut second = mention("CVE-2021-3156", "2", "bob");
        second.published_date = "2021-12-10T08:00:00.000Z".to_string();
        second.lang = "pt".to_string();

        let aggregates = aggregate_mentions(&[first, second]);
        let agg = &aggregates[0];
        assert_eq!(agg.latest_mention_date, "2021-12-11T08:00:00.000Z");
        assert!(agg.languages.contains("en") && agg.languages.contains("pt"));
        // attack type survives items without one
        assert_eq!(agg.attack_type.as_deref(), Some("rce"));
    }

    #[test]
    fn test_parse_item_resolves_repost_metadata() {
        let line = json!({
            "data": {
                "id": "2",
                "text": "RT patch now: CVE-2021-44228",
                "created_at": "2021-12-10T12:00:00.000Z",
                "lang": "en",
                "author_id": "bob",
                "public_metrics": { "retweet_count": 0 },
                "referenced_tweets": [ { "type": "retweeted", "id": "1" } ]
            },
            "includes": {
                "users": [
                    { "id": "bob", "public_metrics": { "followers_count": 10 } },
                    { "id": "alice", "public_metrics": { "followers_count": 5000 } }
                ],
                "tweets": [
                    {
                        "id": "1",
                        "text": "patch now: CVE-2021-44228",
                        "created_at": "2021-12-10T11:00:00.000Z",
                        "author_id": "alice",
                        "public_metrics": { "retweet_count": 44 }
                    }
                ]
            }
        })
        .to_string();

        let record = parse_item(&line).unwrap().unwrap();
        assert_eq!(record.cve_id, "CVE-2021-44228");
        assert_eq!(record.author_followers, 10);
        assert_eq!(record.original_post_id.as_deref(), Some("1"));
        assert_eq!(record.original_retweet_count, Some(44));
        assert_eq!(record.original_author_followers, Some(5000));
    }

    #[test]
    fn test_parse_item_without_cve_is_dropped() {
        let line = json!({
            "data": {
                "id": "9",
                "text": "nothing to see here",
                "created_at": "2021-12-10T12:00:00.000Z",
                "lang": "en",
                "author_id": "bob"
            }
        })
        .to_string();

        assert!(parse_item(&line).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_collects_stream_lines() {
        let mock_server = MockServer::start().await;

        let item = json!({
            "data": {
                "id": "1",
                "text": "exploit in the wild CVE-2021-44228",
                "created_at": "2021-12-10T12:00:00.000Z",
                "lang": "en",
                "author_id": "alice",
                "public_metrics": { "retweet_count": 3 }
            },
            "includes": {
                "users": [ { "id": "alice", "public_metrics": { "followers_count": 42 } } ]
            }
        });
        let body = format!("{item}\n\n{{\"data\":null}}\nnot json\n");

        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let source = MentionStreamSource::new(
            format!("{}/stream", mock_server.uri()),
            "token",
            Duration::from_secs(5),
        );

        // the malformed line and the empty item are skipped
        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cve_id, "CVE-2021-44228");
        assert_eq!(records[0].author_followers, 42);
    }

    #[tokio::test]
    async fn test_fetch_keeps_final_unterminated_line() {
        let mock_server = MockServer::start().await;

        let first = json!({
            "data": {
                "id": "1",
                "text": "CVE-2021-44228 everywhere",
                "created_at": "2021-12-10T12:00:00.000Z",
                "lang": "en",
                "author_id": "alice"
            }
        });
        let last = json!({
            "data": {
                "id": "2",
                "text": "CVE-2021-3156 too",
                "created_at": "2021-12-10T13:00:00.000Z",
                "lang": "en",
                "author_id": "bob"
            }
        });
        // no newline after the last item
        let body = format!("{first}\n{last}");

        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let source = MentionStreamSource::new(
            format!("{}/stream", mock_server.uri()),
            "token",
            Duration::from_secs(5),
        );

        let records = source.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].cve_id, "CVE-2021-3156");
    }
}
