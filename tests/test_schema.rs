#![allow(dead_code)]

// use ebml_master::schema::easy_schema;
// easy_schema! {
//     pub fn test_schema {
//         Ebml                                 : Master = 0x1a45dfa3,
//         Ebml/EbmlVersion                     : UnsignedInt = 0x4286 [mandatory, default = 1],
//         Ebml/DocType                         : Utf8 = 0x4282 [mandatory, default = "webm", max = 1],
//         Segment                              : Master = 0x18538067,
//         Segment/Info                         : Master = 0x1549a966 [max = 1],
//         Segment/Info/Title                   : Utf8 = 0x7ba9,
//         Segment/Info/Duration                : Float = 0x4489,
//         Segment/Info/TimecodeScale           : UnsignedInt = 0x2ad7b1 [mandatory, default = 1000000],
//         Segment/Tracks                       : Master = 0x1654ae6b,
//         Segment/Tracks/TrackEntry            : Master = 0xae,
//         Segment/Tracks/TrackEntry/TrackNumber: UnsignedInt = 0xd7 [mandatory],
//         Segment/Tracks/TrackEntry/Offset     : Integer = 0x537f,
//         Segment/Tracks/TrackEntry/CodecPrivate: Binary = 0x63a2,
//         Segment/Cluster                      : Master = 0x1f43b675,
//         Segment/Cluster/Timecode             : UnsignedInt = 0xe7 [mandatory],
//         Segment/Cluster/SimpleBlock          : Binary = 0xa3,
//     }
// }

// Expansion of the easy_schema! invocation above
// ===============================================

use std::sync::OnceLock;

use ebml_master::schema::{DataType, DefaultValue, ElementClass, SchemaBuilder, SchemaRegistry};

pub const EBML: u64 = 0x1a45dfa3;
pub const EBML_VERSION: u64 = 0x4286;
pub const DOC_TYPE: u64 = 0x4282;
pub const SEGMENT: u64 = 0x18538067;
pub const INFO: u64 = 0x1549a966;
pub const TITLE: u64 = 0x7ba9;
pub const DURATION: u64 = 0x4489;
pub const TIMECODE_SCALE: u64 = 0x2ad7b1;
pub const TRACKS: u64 = 0x1654ae6b;
pub const TRACK_ENTRY: u64 = 0xae;
pub const TRACK_NUMBER: u64 = 0xd7;
pub const OFFSET: u64 = 0x537f;
pub const CODEC_PRIVATE: u64 = 0x63a2;
pub const CLUSTER: u64 = 0x1f43b675;
pub const TIMECODE: u64 = 0xe7;
pub const SIMPLE_BLOCK: u64 = 0xa3;

pub fn test_schema() -> &'static SchemaRegistry {
    static SCHEMA: OnceLock<SchemaRegistry> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        SchemaBuilder::new()
            .element(ElementClass::new(EBML, "Ebml", DataType::Master))
            .element(ElementClass::new(EBML_VERSION, "EbmlVersion", DataType::UnsignedInt).parent(EBML).mandatory().default_value(DefaultValue::UnsignedInt(1)))
            .element(ElementClass::new(DOC_TYPE, "DocType", DataType::Utf8).parent(EBML).mandatory().default_value(DefaultValue::Utf8(String::from("webm"))).max_occurs(1))
            .element(ElementClass::new(SEGMENT, "Segment", DataType::Master))
            .element(ElementClass::new(INFO, "Info", DataType::Master).parent(SEGMENT).max_occurs(1))
            .element(ElementClass::new(TITLE, "Title", DataType::Utf8).parent(INFO))
            .element(ElementClass::new(DURATION, "Duration", DataType::Float).parent(INFO))
            .element(ElementClass::new(TIMECODE_SCALE, "TimecodeScale", DataType::UnsignedInt).parent(INFO).mandatory().default_value(DefaultValue::UnsignedInt(1000000)))
            .element(ElementClass::new(TRACKS, "Tracks", DataType::Master).parent(SEGMENT))
            .element(ElementClass::new(TRACK_ENTRY, "TrackEntry", DataType::Master).parent(TRACKS))
            .element(ElementClass::new(TRACK_NUMBER, "TrackNumber", DataType::UnsignedInt).parent(TRACK_ENTRY).mandatory())
            .element(ElementClass::new(OFFSET, "Offset", DataType::Integer).parent(TRACK_ENTRY))
            .element(ElementClass::new(CODEC_PRIVATE, "CodecPrivate", DataType::Binary).parent(TRACK_ENTRY))
            .element(ElementClass::new(CLUSTER, "Cluster", DataType::Master).parent(SEGMENT))
            .element(ElementClass::new(TIMECODE, "Timecode", DataType::UnsignedInt).parent(CLUSTER).mandatory())
            .element(ElementClass::new(SIMPLE_BLOCK, "SimpleBlock", DataType::Binary).parent(CLUSTER))
            .build()
            .expect("easy_schema! validates the schema at compile time")
    })
}
