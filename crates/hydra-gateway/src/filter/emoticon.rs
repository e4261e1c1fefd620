//! WeChat bracket-emoticon replacement for inbound text.

use async_trait::async_trait;

use hydra_core::bus::Filter;
use hydra_core::types::Event;

/// WeChat emoticon codes and their closest Unicode equivalents.
const EMOTICONS: &[(&str, &str)] = &[
    ("[Smile]", "😄"),
    ("[Grimace]", "😬"),
    ("[Drool]", "🤤"),
    ("[Scowl]", "😳"),
    ("[Chill]", "😎"),
    ("[Sob]", "😭"),
    ("[Shy]", "☺️"),
    ("[Shutup]", "🤐"),
    ("[Sleep]", "😴"),
    ("[Cry]", "😣"),
    ("[Awkward]", "😰"),
    ("[Pout]", "😡"),
    ("[Wink]", "😜"),
    ("[Grin]", "😁"),
    ("[Surprised]", "😱"),
    ("[Frown]", "🙁"),
    ("[Scream]", "😫"),
    ("[Puke]", "🤢"),
    ("[Chuckle]", "😏"),
    ("[Joyful]", "☺️"),
    ("[Slight]", "🙂"),
    ("[Smug]", "😏"),
    ("[Drowsy]", "😪"),
    ("[Panic]", "😱"),
    ("[Sweat]", "😓"),
    ("[Laugh]", "😄"),
    ("[Strive]", "💪"),
    ("[Scold]", "🤬"),
    ("[Doubt]", "❓"),
    ("[Shhh]", "🤫"),
    ("[Dizzy]", "😲"),
    ("[Skull]", "💀"),
    ("[Hammer]", "🔨"),
    ("[Bye]", "👋"),
    ("[Relief]", "😥"),
    ("[DigNose]", "🤷"),
    ("[Clap]", "👏"),
    ("[Trick]", "👻"),
    ("[Yawn]", "🥱"),
    ("[Lookdown]", "😒"),
    ("[Wronged]", "😣"),
    ("[Puling]", "😭"),
    ("[Sly]", "😏"),
    ("[Kiss]", "😘"),
    ("[Whimper]", "😿"),
    ("[Cleaver]", "🔪"),
    ("[Melon]", "🍉"),
    ("[Beer]", "🍺"),
    ("[Coffee]", "☕"),
    ("[Pig]", "🐷"),
    ("[Rose]", "🌹"),
    ("[Wilt]", "🥀"),
    ("[Lip]", "👄"),
    ("[Heart]", "❤️"),
    ("[BrokenHeart]", "💔"),
    ("[Cake]", "🎂"),
    ("[Bomb]", "💣"),
    ("[Poop]", "💩"),
    ("[Moon]", "🌙"),
    ("[Sun]", "🌞"),
    ("[Hug]", "🤗"),
    ("[Strong]", "👍"),
    ("[Weak]", "👎"),
    ("[Shake]", "🤝"),
    ("[Victory]", "✌️"),
    ("[Salute]", "🙏"),
    ("[Beckon]", "👋"),
    ("[Fist]", "✊"),
    ("[OK]", "👌"),
    ("[Aaagh!]", "😡"),
    ("[Twirl]", "💃"),
    ("[Hey]", "🤣"),
    ("[Facepalm]", "🤦"),
    ("[Smirk]", "😏"),
    ("[Smart]", "🤠"),
    ("[Concerned]", "😟"),
    ("[Yeah!]", "✌️"),
    ("[Packet]", "🧧"),
    ("[Chick]", "🐥"),
    ("[Candle]", "🕯️"),
    ("[ThumbsUp]", "👍"),
    ("[ThumbsDown]", "👎"),
    ("[Peace]", "✌️"),
    ("[Pleased]", "😊"),
    ("[Rich]", "🤑"),
    ("[Pup]", "🐶"),
    ("[Onlooker]", "👀"),
    ("[GoForIt]", "💪"),
    ("[Sweats]", "😅"),
    ("[OMG]", "😱"),
    ("[Emm]", "🤔"),
    ("[Respect]", "🙏"),
    ("[Doge]", "🐶"),
    ("[NoProb]", "👌"),
    ("[Wow]", "🤩"),
    ("[MyBad]", "😅"),
    ("[Lol]", "😂"),
    ("[Hurt]", "😭"),
    ("[Boring]", "🙄"),
    ("[Firecracker]", "🧨"),
    ("[Fireworks]", "🎆"),
    ("[Blessing]", "🧧"),
    ("[Gift]", "🎁"),
    ("[Party]", "🎉"),
    ("[Worship]", "🙏"),
    ("[LetMeSee]", "👀"),
    ("[Duh]", "😒"),
    ("[Let Down]", "😔"),
    ("[Terror]", "😨"),
    ("[Flushed]", "😳"),
    ("[Sick]", "😷"),
    ("[Happy]", "😁"),
];

pub(crate) fn replace_emoticons(text: &str) -> String {
    if !text.contains('[') {
        return text.to_string();
    }
    let mut out = text.to_string();
    for (code, emoji) in EMOTICONS {
        if out.contains(code) {
            out = out.replace(code, emoji);
        }
    }
    out
}

/// WeChat → Telegram: swap bracket emoticon codes for emoji in the text
/// content.
pub struct EmoticonInbound;

#[async_trait]
impl Filter for EmoticonInbound {
    fn name(&self) -> &'static str {
        "emoticon_inbound"
    }

    async fn apply(&self, mut event: Event) -> Option<Event> {
        if event.vendor.kind == "wechat" && !event.content.is_empty() {
            event.content = replace_emoticons(&event.content);
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use hydra_core::types::Vendor;

    use super::*;

    #[test]
    fn codes_are_replaced() {
        assert_eq!(replace_emoticons("hi [Smile][Rose]"), "hi 😄🌹");
        assert_eq!(replace_emoticons("no emoticons"), "no emoticons");
        assert_eq!(replace_emoticons("[Unknown] stays"), "[Unknown] stays");
    }

    #[tokio::test]
    async fn only_wechat_content_is_rewritten() {
        let mut event = Event::new(Vendor::new("wechat", "w1"), "1", 0);
        event.content = "[Smile]".to_string();
        let event = EmoticonInbound.apply(event).await.unwrap();
        assert_eq!(event.content, "😄");

        let mut event = Event::new(Vendor::new("qq", "9"), "1", 0);
        event.content = "[Smile]".to_string();
        let event = EmoticonInbound.apply(event).await.unwrap();
        assert_eq!(event.content, "[Smile]");
    }
}
