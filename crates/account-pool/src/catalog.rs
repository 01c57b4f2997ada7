//! The operation catalog
//!
//! The fixed set of high-level operations exposed to the HTTP surface. Each
//! one builds a closure over the driver verbs and hands it to the
//! dispatcher under a timeout class; the composite operations (large
//! timeline fetch, date-range timeline) paginate through repeated
//! dispatches. Response normalization lives here and only here: the
//! dispatcher below never inspects payload contents beyond the empty check.

use std::time::Duration;

use scraper_driver::{Profile, ProfilePage, SearchMode, Tweet, TweetPage};
use tracing::debug;

use crate::dispatch::{operation, Dispatcher, OpContext, Operation, TimeoutClass};

/// Pause between pages of the large timeline fetch.
const LARGE_FETCH_PAUSE: Duration = Duration::from_millis(500);
/// Page size for internal pagination loops.
const PAGE_SIZE: usize = 20;

/// The catalog of upstream operations.
pub struct Catalog {
    dispatcher: Dispatcher,
}

impl Catalog {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Search tweets under the given tab.
    pub async fn search_tweets(
        &self,
        query: &str,
        mode: SearchMode,
        cursor: Option<String>,
    ) -> Option<TweetPage> {
        let query = query.to_string();
        let page = self
            .dispatcher
            .execute(
                "searchTweets",
                TimeoutClass::Search,
                operation(move |cx: OpContext| {
                    let query = query.clone();
                    let cursor = cursor.clone();
                    async move { cx.scraper.search_tweets(&query, mode, cursor.as_deref()).await }
                }),
            )
            .await?;
        Some(normalize_page(page))
    }

    /// Profile by username.
    pub async fn get_profile(&self, username: &str) -> Option<Profile> {
        let username = username.to_string();
        self.dispatcher
            .execute(
                "getProfile",
                TimeoutClass::Profile,
                operation(move |cx: OpContext| {
                    let username = username.clone();
                    async move { cx.scraper.get_profile(&username).await }
                }),
            )
            .await
    }

    /// Profile by numeric user id.
    pub async fn get_profile_by_user_id(&self, user_id: &str) -> Option<Profile> {
        let user_id = user_id.to_string();
        self.dispatcher
            .execute(
                "getProfileByUserId",
                TimeoutClass::Profile,
                operation(move |cx: OpContext| {
                    let user_id = user_id.clone();
                    async move { cx.scraper.get_profile_by_user_id(&user_id).await }
                }),
            )
            .await
    }

    /// Several profiles in one batch dispatch.
    pub async fn get_profiles(&self, usernames: &[String]) -> Vec<Option<Profile>> {
        let ops: Vec<Operation<Profile>> = usernames
            .iter()
            .map(|username| {
                let username = username.clone();
                operation(move |cx: OpContext| {
                    let username = username.clone();
                    async move { cx.scraper.get_profile(&username).await }
                })
            })
            .collect();
        self.dispatcher
            .execute_batch("getProfiles", TimeoutClass::Profile, ops)
            .await
    }

    /// A user's timeline, no replies.
    pub async fn get_tweets(&self, username: &str, max: usize) -> Option<Vec<Tweet>> {
        let username = username.to_string();
        let tweets = self
            .dispatcher
            .execute(
                "getTweets",
                TimeoutClass::Tweet,
                operation(move |cx: OpContext| {
                    let username = username.clone();
                    async move { cx.scraper.get_tweets(&username, max).await }
                }),
            )
            .await?;
        Some(tweets.into_iter().map(normalize_tweet).collect())
    }

    /// A user's timeline including replies.
    pub async fn get_tweets_and_replies(&self, username: &str, max: usize) -> Option<Vec<Tweet>> {
        let username = username.to_string();
        let tweets = self
            .dispatcher
            .execute(
                "getTweetsAndReplies",
                TimeoutClass::Tweet,
                operation(move |cx: OpContext| {
                    let username = username.clone();
                    async move { cx.scraper.get_tweets_and_replies(&username, max).await }
                }),
            )
            .await?;
        Some(tweets.into_iter().map(normalize_tweet).collect())
    }

    /// One cursored timeline page for a user id or screen name.
    pub async fn get_user_tweets(
        &self,
        id_or_name: &str,
        page_size: usize,
        cursor: Option<String>,
    ) -> Option<TweetPage> {
        let id_or_name = id_or_name.to_string();
        let page = self
            .dispatcher
            .execute(
                "getUserTweets",
                TimeoutClass::Tweet,
                operation(move |cx: OpContext| {
                    let id_or_name = id_or_name.clone();
                    let cursor = cursor.clone();
                    async move {
                        cx.scraper
                            .get_user_tweets(&id_or_name, page_size, cursor.as_deref())
                            .await
                    }
                }),
            )
            .await?;
        Some(normalize_page(page))
    }

    /// The most recent tweet on a user's timeline.
    pub async fn get_latest_tweet(&self, username: &str) -> Option<Tweet> {
        self.get_tweets(username, 1).await?.into_iter().next()
    }

    /// A single tweet by id.
    pub async fn get_tweet(&self, id: &str) -> Option<Tweet> {
        let id = id.to_string();
        let tweet = self
            .dispatcher
            .execute(
                "getTweet",
                TimeoutClass::Tweet,
                operation(move |cx: OpContext| {
                    let id = id.clone();
                    async move { cx.scraper.get_tweet(&id).await }
                }),
            )
            .await?;
        Some(normalize_tweet(tweet))
    }

    /// Replies to a tweet, via a conversation search.
    pub async fn get_tweet_replies(&self, id: &str) -> Option<Vec<Tweet>> {
        let page = self
            .search_tweets(&format!("conversation_id:{id}"), SearchMode::Latest, None)
            .await?;
        Some(page.tweets)
    }

    /// Quote tweets of a tweet, via a quote search.
    pub async fn get_tweet_quotes(&self, id: &str) -> Option<Vec<Tweet>> {
        let page = self
            .search_tweets(&format!("quoted_tweet_id:{id}"), SearchMode::Latest, None)
            .await?;
        Some(page.tweets)
    }

    /// One page of a profile's followers.
    pub async fn get_profile_followers(
        &self,
        user_id: &str,
        max: usize,
        cursor: Option<String>,
    ) -> Option<ProfilePage> {
        let user_id = user_id.to_string();
        self.dispatcher
            .execute(
                "getProfileFollowers",
                TimeoutClass::Profile,
                operation(move |cx: OpContext| {
                    let user_id = user_id.clone();
                    let cursor = cursor.clone();
                    async move {
                        cx.scraper
                            .fetch_profile_followers(&user_id, max, cursor.as_deref())
                            .await
                    }
                }),
            )
            .await
    }

    /// One page of the profiles a user follows.
    pub async fn get_profile_following(
        &self,
        user_id: &str,
        max: usize,
        cursor: Option<String>,
    ) -> Option<ProfilePage> {
        let user_id = user_id.to_string();
        self.dispatcher
            .execute(
                "getProfileFollowing",
                TimeoutClass::Profile,
                operation(move |cx: OpContext| {
                    let user_id = user_id.clone();
                    let cursor = cursor.clone();
                    async move {
                        cx.scraper
                            .fetch_profile_following(&user_id, max, cursor.as_deref())
                            .await
                    }
                }),
            )
            .await
    }

    /// Profiles matching a query. Finite and non-restartable: the driver
    /// stops at `max` or cursor exhaustion, the search timeout class bounds
    /// the whole pass, and an account failure surfaces as `None`.
    pub async fn search_profiles(&self, query: &str, max: usize) -> Option<Vec<Profile>> {
        let query = query.to_string();
        self.dispatcher
            .execute(
                "searchProfiles",
                TimeoutClass::Search,
                operation(move |cx: OpContext| {
                    let query = query.clone();
                    async move { cx.scraper.search_profiles(&query, max).await }
                }),
            )
            .await
    }

    /// Large timeline fetch: paginates until `max_tweets` or cursor
    /// exhaustion, pausing between pages, with doubled per-page timeouts.
    pub async fn get_user_tweets_large(
        &self,
        id_or_name: &str,
        max_tweets: usize,
    ) -> Option<Vec<Tweet>> {
        let timeout = TimeoutClass::Tweet.duration(self.dispatcher.timeout_classes()) * 2;
        let mut collected: Vec<Tweet> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let id_or_name = id_or_name.to_string();
            let page_cursor = cursor.clone();
            let page = self
                .dispatcher
                .execute_timed(
                    "getUserTweetsLarge",
                    timeout,
                    operation(move |cx: OpContext| {
                        let id_or_name = id_or_name.clone();
                        let page_cursor = page_cursor.clone();
                        async move {
                            cx.scraper
                                .get_user_tweets(&id_or_name, PAGE_SIZE, page_cursor.as_deref())
                                .await
                        }
                    }),
                )
                .await;

            let Some(page) = page else {
                // Nothing at all is a miss; a partial fetch still counts
                if collected.is_empty() {
                    return None;
                }
                break;
            };
            collected.extend(page.tweets.into_iter().map(normalize_tweet));
            if collected.len() >= max_tweets {
                collected.truncate(max_tweets);
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            tokio::time::sleep(LARGE_FETCH_PAUSE).await;
        }

        debug!(
            id_or_name,
            tweets = collected.len(),
            "large timeline fetch complete"
        );
        Some(collected)
    }

    /// Timeline slice between two timestamps, inclusive. `start` is the
    /// newer bound, `end` the older one; iteration stops at the first tweet
    /// older than `end`.
    pub async fn get_user_timeline_in_date_range(
        &self,
        id_or_name: &str,
        start: i64,
        end: i64,
    ) -> Option<Vec<Tweet>> {
        let mut collected: Vec<Tweet> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .get_user_tweets(id_or_name, PAGE_SIZE, cursor.clone())
                .await?;
            if page.tweets.is_empty() {
                break;
            }

            for tweet in page.tweets {
                let Some(at) = tweet.timestamp else {
                    continue;
                };
                if at < end {
                    // Timelines are newest-first: everything further is older
                    return Some(collected);
                }
                if at <= start {
                    collected.push(tweet);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Some(collected)
    }

    /// Timeline slice via the search index: `from:user since:… until:…`.
    pub async fn get_user_timeline_by_search(
        &self,
        username: &str,
        since: &str,
        until: &str,
    ) -> Option<Vec<Tweet>> {
        let page = self
            .search_tweets(
                &format!("from:{username} since:{since} until:{until}"),
                SearchMode::Latest,
                None,
            )
            .await?;
        Some(page.tweets)
    }
}

fn normalize_page(page: TweetPage) -> TweetPage {
    TweetPage {
        tweets: page.tweets.into_iter().map(normalize_tweet).collect(),
        next_cursor: page.next_cursor,
    }
}

/// Light passthrough fixes applied to every outgoing tweet.
fn normalize_tweet(mut tweet: Tweet) -> Tweet {
    if tweet.username.is_none() {
        tweet.username = tweet
            .permanent_url
            .as_deref()
            .and_then(username_from_url)
            .map(str::to_string);
    }
    if tweet.text.is_none() {
        tweet.text = tweet.html.as_deref().map(strip_markup);
    }
    // Reply chains can nest (or cycle) arbitrarily deep
    tweet.in_reply_to_status = None;
    tweet
}

/// The username is the 4th `/`-separated segment of a permanent URL,
/// e.g. `https://x.com/alice/status/1` → `alice`.
fn username_from_url(url: &str) -> Option<&str> {
    url.split('/').nth(3).filter(|s| !s.is_empty())
}

/// Drop tags, turn `<br>` into newlines, and decode the handful of
/// entities the upstream emits in tweet HTML.
fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag.trim_start_matches('/').to_ascii_lowercase();
                if name.starts_with("br") {
                    out.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => out.push(c),
        }
    }

    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
