//! Wire keys
//!
//! `info` holds the keys read from inbound event params. The remaining
//! modules hold the keys written into outbound hits and reports.

/// Inbound parameter keys
pub mod info {
    pub const MEDIA_ID: &str = "media.id";
    pub const MEDIA_NAME: &str = "media.name";
    pub const MEDIA_LENGTH: &str = "media.length";
    pub const MEDIA_TYPE: &str = "media.type";
    pub const MEDIA_STREAM_TYPE: &str = "media.streamtype";
    pub const MEDIA_RESUMED: &str = "media.resumed";
    pub const MEDIA_PREROLL_WAIT_TIME: &str = "media.prerollwaitingtime";
    pub const MEDIA_GRANULAR_AD_TRACKING: &str = "media.granularadtracking";

    pub const AD_BREAK_NAME: &str = "adbreak.name";
    pub const AD_BREAK_POSITION: &str = "adbreak.position";
    pub const AD_BREAK_START_TIME: &str = "adbreak.starttime";

    pub const AD_ID: &str = "ad.id";
    pub const AD_NAME: &str = "ad.name";
    pub const AD_POSITION: &str = "ad.position";
    pub const AD_LENGTH: &str = "ad.length";

    pub const CHAPTER_NAME: &str = "chapter.name";
    pub const CHAPTER_POSITION: &str = "chapter.position";
    pub const CHAPTER_START_TIME: &str = "chapter.starttime";
    pub const CHAPTER_LENGTH: &str = "chapter.length";

    pub const QOE_BITRATE: &str = "qoe.bitrate";
    pub const QOE_DROPPED_FRAMES: &str = "qoe.droppedframes";
    pub const QOE_FPS: &str = "qoe.fps";
    pub const QOE_STARTUP_TIME: &str = "qoe.startuptime";

    pub const ERROR_ID: &str = "error.id";
    pub const STATE_NAME: &str = "state.name";
    pub const PLAYHEAD: &str = "time.playhead";

    /// Client-side session id carried on sessionStart hits until reported
    pub const SESSION_ID: &str = "sessionid";
}

pub mod media {
    pub const ID: &str = "media.id";
    pub const NAME: &str = "media.name";
    pub const LENGTH: &str = "media.length";
    pub const CONTENT_TYPE: &str = "media.contentType";
    pub const STREAM_TYPE: &str = "media.streamType";
    pub const RESUME: &str = "media.resume";
    pub const DOWNLOADED: &str = "media.downloaded";
    pub const CHANNEL: &str = "media.channel";
    pub const PLAYER_NAME: &str = "media.playerName";
    pub const SDK_VERSION: &str = "media.sdkVersion";
    pub const LIBRARY_VERSION: &str = "media.version";
}

pub mod analytics {
    pub const TRACKING_SERVER: &str = "analytics.trackingServer";
    pub const REPORT_SUITE: &str = "analytics.reportSuite";
    pub const ENABLE_SSL: &str = "analytics.enableSSL";
    pub const VISITOR_ID: &str = "analytics.visitorId";
    pub const AID: &str = "analytics.aid";
    pub const ORG_ID: &str = "visitor.marketingCloudOrgId";
    pub const USER_ID: &str = "visitor.marketingCloudUserId";
    pub const LOCATION_HINT: &str = "visitor.aamLocationHint";
}

pub mod ad_break {
    pub const POD_FRIENDLY_NAME: &str = "media.ad.podFriendlyName";
    pub const POD_INDEX: &str = "media.ad.podIndex";
    pub const POD_SECOND: &str = "media.ad.podSecond";
}

pub mod ad {
    pub const NAME: &str = "media.ad.name";
    pub const ID: &str = "media.ad.id";
    pub const LENGTH: &str = "media.ad.length";
    pub const POD_POSITION: &str = "media.ad.podPosition";
    pub const PLAYER_NAME: &str = "media.ad.playerName";
}

pub mod chapter {
    pub const FRIENDLY_NAME: &str = "media.chapter.friendlyName";
    pub const LENGTH: &str = "media.chapter.length";
    pub const OFFSET: &str = "media.chapter.offset";
    pub const INDEX: &str = "media.chapter.index";
}

pub mod qoe {
    pub const BITRATE: &str = "media.qoe.bitrate";
    pub const DROPPED_FRAMES: &str = "media.qoe.droppedFrames";
    pub const FPS: &str = "media.qoe.framesPerSecond";
    pub const TIME_TO_START: &str = "media.qoe.timeToStart";
    pub const ERROR_ID: &str = "media.qoe.errorID";
    pub const ERROR_SOURCE: &str = "media.qoe.errorSource";
    pub const ERROR_SOURCE_PLAYER: &str = "player";
}

pub mod state {
    pub const NAME: &str = "media.state.name";
}

/// Report object keys
pub mod report {
    pub const EVENT_TYPE: &str = "eventType";
    pub const PARAMS: &str = "params";
    pub const QOE_DATA: &str = "qoeData";
    pub const CUSTOM_METADATA: &str = "customMetadata";
    pub const PLAYER_TIME: &str = "playerTime";
    pub const PLAYHEAD: &str = "playhead";
    pub const TS: &str = "ts";
}

/// Standard content metadata: caller key to collection param key
pub const STANDARD_MEDIA_METADATA: &[(&str, &str)] = &[
    ("a.media.show", "media.show"),
    ("a.media.season", "media.season"),
    ("a.media.episode", "media.episode"),
    ("a.media.asset", "media.assetId"),
    ("a.media.genre", "media.genre"),
    ("a.media.airDate", "media.firstAirDate"),
    ("a.media.digitalDate", "media.firstDigitalDate"),
    ("a.media.rating", "media.rating"),
    ("a.media.originator", "media.originator"),
    ("a.media.network", "media.network"),
    ("a.media.type", "media.showType"),
    ("a.media.adLoad", "media.adLoad"),
    ("a.media.pass.mvpd", "media.pass.mvpd"),
    ("a.media.pass.auth", "media.pass.auth"),
    ("a.media.dayPart", "media.dayPart"),
    ("a.media.feed", "media.feed"),
    ("a.media.format", "media.streamFormat"),
    ("a.media.artist", "media.artist"),
    ("a.media.album", "media.album"),
    ("a.media.label", "media.label"),
    ("a.media.author", "media.author"),
    ("a.media.station", "media.station"),
    ("a.media.publisher", "media.publisher"),
];

/// Standard ad metadata: caller key to collection param key
pub const STANDARD_AD_METADATA: &[(&str, &str)] = &[
    ("a.media.ad.advertiser", "media.ad.advertiser"),
    ("a.media.ad.campaign", "media.ad.campaignId"),
    ("a.media.ad.creative", "media.ad.creativeId"),
    ("a.media.ad.placement", "media.ad.placementId"),
    ("a.media.ad.site", "media.ad.siteId"),
    ("a.media.ad.creativeURL", "media.ad.creativeURL"),
];

/// Looks up the collection key for a standard metadata key
pub fn standard_key(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| *to)
}
