//! Decrypted inner messages and passive replies
//!
//! The inner XML is parsed once into a field map and typed accessors project
//! from it, so nothing depends on the order the platform emits tags in.

use serde::{Deserialize, Serialize};

use crate::error::{AesError, AesResult};
use crate::xml::{self, XmlBuilder, XmlFields};

/// `MsgType` value that marks an event
pub const EVENT_MSG_TYPE: &str = "event";

/// What an inbound callback carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// User message, with its `MsgType` (text, image, voice, ...)
    Message(String),
    /// Platform event, with its `Event` (subscribe, CLICK, ...)
    Event(String),
}

/// Decrypted inner message
#[derive(Debug, Clone)]
pub struct InnerMessage {
    raw: String,
    fields: XmlFields,
}

impl InnerMessage {
    pub fn parse(raw: impl Into<String>) -> AesResult<Self> {
        let raw = raw.into();
        let fields = xml::parse(&raw)?;
        Ok(Self { raw, fields })
    }

    /// Read `MsgType`, and `Event` for events
    pub fn classify(&self) -> AesResult<Classified> {
        let msg_type = self
            .msg_type()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AesError::XmlParse("missing MsgType".to_string()))?;

        if msg_type.eq_ignore_ascii_case(EVENT_MSG_TYPE) {
            let event = self
                .event()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| AesError::XmlParse("event without Event tag".to_string()))?;
            Ok(Classified::Event(event.to_string()))
        } else {
            Ok(Classified::Message(msg_type.to_string()))
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn fields(&self) -> &XmlFields {
        &self.fields
    }

    /// Any field by path, e.g. `ScanCodeInfo/ScanResult`
    pub fn field(&self, path: &str) -> Option<&str> {
        self.fields.get(path)
    }

    pub fn to_user_name(&self) -> Option<&str> {
        self.field("ToUserName")
    }

    pub fn from_user_name(&self) -> Option<&str> {
        self.field("FromUserName")
    }

    pub fn create_time(&self) -> Option<i64> {
        self.field("CreateTime")?.trim().parse().ok()
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.field("MsgType").map(str::trim)
    }

    pub fn event(&self) -> Option<&str> {
        self.field("Event").map(str::trim)
    }

    pub fn event_key(&self) -> Option<&str> {
        self.field("EventKey")
    }

    pub fn content(&self) -> Option<&str> {
        self.field("Content")
    }

    pub fn msg_id(&self) -> Option<&str> {
        self.field("MsgId")
    }

    pub fn media_id(&self) -> Option<&str> {
        self.field("MediaId")
    }

    /// WeCom application id
    pub fn agent_id(&self) -> Option<&str> {
        self.field("AgentID")
    }
}

/// News article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pic_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Passive reply produced by a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Text {
        content: String,
    },
    Image {
        media_id: String,
    },
    Voice {
        media_id: String,
    },
    Video {
        media_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    Music {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        music_url: Option<String>,
        #[serde(default)]
        hq_music_url: Option<String>,
        thumb_media_id: String,
    },
    News {
        articles: Vec<Article>,
    },
    /// Hand the conversation over to customer service
    TransferCustomerService {
        #[serde(default)]
        kf_account: Option<String>,
    },
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// `MsgType` written into the reply
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Voice { .. } => "voice",
            Self::Video { .. } => "video",
            Self::Music { .. } => "music",
            Self::News { .. } => "news",
            Self::TransferCustomerService { .. } => "transfer_customer_service",
        }
    }

    /// Render the reply document
    ///
    /// `to_user` is the inbound sender and `from_user` the inbound receiver.
    pub fn to_xml(&self, to_user: &str, from_user: &str, create_time: i64) -> String {
        let builder = XmlBuilder::new()
            .cdata("ToUserName", to_user)
            .cdata("FromUserName", from_user)
            .text("CreateTime", &create_time.to_string())
            .cdata("MsgType", self.msg_type());

        let builder = match self {
            Self::Text { content } => builder.cdata("Content", content),
            Self::Image { media_id } => builder
                .open("Image")
                .cdata("MediaId", media_id)
                .close("Image"),
            Self::Voice { media_id } => builder
                .open("Voice")
                .cdata("MediaId", media_id)
                .close("Voice"),
            Self::Video {
                media_id,
                title,
                description,
            } => builder
                .open("Video")
                .cdata("MediaId", media_id)
                .cdata_opt("Title", title.as_deref())
                .cdata_opt("Description", description.as_deref())
                .close("Video"),
            Self::Music {
                title,
                description,
                music_url,
                hq_music_url,
                thumb_media_id,
            } => builder
                .open("Music")
                .cdata_opt("Title", title.as_deref())
                .cdata_opt("Description", description.as_deref())
                .cdata_opt("MusicUrl", music_url.as_deref())
                .cdata_opt("HQMusicUrl", hq_music_url.as_deref())
                .cdata("ThumbMediaId", thumb_media_id)
                .close("Music"),
            Self::News { articles } => {
                let builder = builder
                    .text("ArticleCount", &articles.len().to_string())
                    .open("Articles");
                articles
                    .iter()
                    .fold(builder, |b, a| {
                        b.open("item")
                            .cdata("Title", &a.title)
                            .cdata_opt("Description", a.description.as_deref())
                            .cdata_opt("PicUrl", a.pic_url.as_deref())
                            .cdata_opt("Url", a.url.as_deref())
                            .close("item")
                    })
                    .close("Articles")
            }
            Self::TransferCustomerService { kf_account } => match kf_account {
                Some(account) => builder
                    .open("TransInfo")
                    .cdata("KfAccount", account)
                    .close("TransInfo"),
                None => builder,
            },
        };
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_MSG: &str = r#"<xml>
        <ToUserName><![CDATA[gh_abc]]></ToUserName>
        <FromUserName><![CDATA[openid123]]></FromUserName>
        <CreateTime>1348831860</CreateTime>
        <MsgType><![CDATA[text]]></MsgType>
        <Content><![CDATA[this is a test]]></Content>
        <MsgId>1234567890123456</MsgId>
    </xml>"#;

    const SUBSCRIBE_EVENT: &str = r#"<xml>
        <ToUserName><![CDATA[gh_abc]]></ToUserName>
        <FromUserName><![CDATA[openid123]]></FromUserName>
        <CreateTime>123456789</CreateTime>
        <MsgType><![CDATA[event]]></MsgType>
        <Event><![CDATA[subscribe]]></Event>
    </xml>"#;

    #[test]
    fn test_text_message_projection() {
        let msg = InnerMessage::parse(TEXT_MSG).unwrap();
        assert_eq!(msg.to_user_name(), Some("gh_abc"));
        assert_eq!(msg.from_user_name(), Some("openid123"));
        assert_eq!(msg.create_time(), Some(1348831860));
        assert_eq!(msg.content(), Some("this is a test"));
        assert_eq!(msg.msg_id(), Some("1234567890123456"));
        assert_eq!(msg.classify().unwrap(), Classified::Message("text".to_string()));
    }

    #[test]
    fn test_event_classification() {
        let msg = InnerMessage::parse(SUBSCRIBE_EVENT).unwrap();
        assert_eq!(
            msg.classify().unwrap(),
            Classified::Event("subscribe".to_string())
        );
    }

    #[test]
    fn test_scan_subscribe_event_key() {
        let xml = r#"<xml>
            <ToUserName><![CDATA[gh_abc]]></ToUserName>
            <FromUserName><![CDATA[openid123]]></FromUserName>
            <CreateTime>123456789</CreateTime>
            <MsgType><![CDATA[event]]></MsgType>
            <Event><![CDATA[subscribe]]></Event>
            <EventKey><![CDATA[qrscene_123123]]></EventKey>
            <Ticket><![CDATA[TICKET]]></Ticket>
        </xml>"#;
        let msg = InnerMessage::parse(xml).unwrap();
        assert_eq!(msg.event_key(), Some("qrscene_123123"));
        assert_eq!(msg.field("Ticket"), Some("TICKET"));
        assert_eq!(InnerMessage::parse(SUBSCRIBE_EVENT).unwrap().event_key(), None);
    }

    #[test]
    fn test_event_without_event_tag() {
        let msg = InnerMessage::parse("<xml><MsgType>event</MsgType></xml>").unwrap();
        assert!(matches!(msg.classify(), Err(AesError::XmlParse(_))));
    }

    #[test]
    fn test_missing_msg_type() {
        let msg = InnerMessage::parse("<xml><Content>hi</Content></xml>").unwrap();
        assert!(msg.classify().is_err());
    }

    #[test]
    fn test_wecom_agent_id() {
        let xml = r#"<xml>
            <ToUserName><![CDATA[ww1234567890abcdef]]></ToUserName>
            <FromUserName><![CDATA[zhangsan]]></FromUserName>
            <CreateTime>1234567890</CreateTime>
            <MsgType><![CDATA[text]]></MsgType>
            <Content><![CDATA[Hello]]></Content>
            <MsgId>1234567890123456</MsgId>
            <AgentID>1000002</AgentID>
        </xml>"#;
        let msg = InnerMessage::parse(xml).unwrap();
        assert_eq!(msg.agent_id(), Some("1000002"));
    }

    #[test]
    fn test_text_reply_xml() {
        let xml = Reply::text("hi there").to_xml("openid123", "gh_abc", 1700000000);
        assert_eq!(
            xml,
            "<xml><ToUserName><![CDATA[openid123]]></ToUserName>\
             <FromUserName><![CDATA[gh_abc]]></FromUserName>\
             <CreateTime>1700000000</CreateTime>\
             <MsgType><![CDATA[text]]></MsgType>\
             <Content><![CDATA[hi there]]></Content></xml>"
        );
    }

    #[test]
    fn test_news_reply_xml() {
        let reply = Reply::News {
            articles: vec![
                Article {
                    title: "one".to_string(),
                    url: Some("https://example.com/1".to_string()),
                    ..Default::default()
                },
                Article {
                    title: "two".to_string(),
                    ..Default::default()
                },
            ],
        };
        let fields = xml::parse(&reply.to_xml("u", "gh", 1)).unwrap();
        assert_eq!(fields.get("MsgType"), Some("news"));
        assert_eq!(fields.get("ArticleCount"), Some("2"));
        let titles: Vec<&str> = fields.get_all("Articles/item/Title").collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(fields.get("Articles/item/Url"), Some("https://example.com/1"));
    }

    #[test]
    fn test_media_replies_nest_media_id() {
        let image = xml::parse(&Reply::Image { media_id: "m1".into() }.to_xml("u", "gh", 1)).unwrap();
        assert_eq!(image.get("Image/MediaId"), Some("m1"));

        let video = Reply::Video {
            media_id: "v1".into(),
            title: Some("clip".into()),
            description: None,
        };
        let video = xml::parse(&video.to_xml("u", "gh", 1)).unwrap();
        assert_eq!(video.get("Video/Title"), Some("clip"));
        assert!(!video.contains("Video/Description"));
    }

    #[test]
    fn test_transfer_customer_service() {
        let reply = Reply::TransferCustomerService {
            kf_account: Some("test1@test".into()),
        };
        let fields = xml::parse(&reply.to_xml("u", "gh", 1)).unwrap();
        assert_eq!(fields.get("MsgType"), Some("transfer_customer_service"));
        assert_eq!(fields.get("TransInfo/KfAccount"), Some("test1@test"));
    }

    #[test]
    fn test_reply_serde_tag() {
        let json = serde_json::to_string(&Reply::text("x")).unwrap();
        assert_eq!(json, r#"{"type":"text","content":"x"}"#);
    }
}
