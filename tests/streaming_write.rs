mod test_schema;

pub mod streaming_write {
    use std::io::Cursor;

    use ebml_master::tools::UNKNOWN_SIZE;
    use ebml_master::{Element, ElementReader, ElementSink, ElementSize, ElementStream, LeafElement, MasterElement, ReadOptions};

    use super::test_schema::*;

    fn cluster(timecode: u64) -> MasterElement {
        let mut cluster = MasterElement::new(test_schema(), CLUSTER).unwrap();
        *cluster.get_child::<u64>(TIMECODE).unwrap() = timecode;
        cluster.push(LeafElement::binary(SIMPLE_BLOCK, &[0x81, 0x00, 0x00, 0x80, 0x2A])).unwrap();
        cluster
    }

    fn info() -> MasterElement {
        let mut info = MasterElement::new(test_schema(), INFO).unwrap();
        info.process_mandatory().unwrap();
        info
    }

    fn ebml() -> MasterElement {
        let mut ebml = MasterElement::new(test_schema(), EBML).unwrap();
        ebml.process_mandatory().unwrap();
        ebml
    }

    fn read_all(data: Vec<u8>) -> Vec<Element> {
        ElementReader::new(Cursor::new(data), test_schema(), ReadOptions::default())
            .collect::<Result<Vec<_>, _>>()
            .expect("Test shouldn't error")
    }

    #[test]
    pub fn streamed_segment_is_patched_afterwards() {
        let mut sink = ElementSink::new(Cursor::new(Vec::new()));
        let mut segment = MasterElement::new(test_schema(), SEGMENT).unwrap();
        segment.set_size_infinite(true);
        assert_eq!(12, segment.write_head(&mut sink, None, false).unwrap());

        let mut children = vec![info(), cluster(0), cluster(1000)];
        for child in children.iter_mut() {
            child.render(&mut sink, false, false).expect("Test shouldn't error");
        }

        let streamed = sink.get_ref().get_ref().clone();
        assert_eq!(&UNKNOWN_SIZE, &streamed[4..12]);
        let read_back = read_all(streamed.clone());
        let unknown = read_back[0].as_master().unwrap();
        assert!(!unknown.is_finite_size());
        assert_eq!(3, unknown.len());

        for child in children {
            segment.push(child).unwrap();
        }
        segment.set_size_infinite(false);
        let size = segment.update_size(false, false).unwrap();
        assert_eq!(ElementSize::Known(streamed.len() as u64 - 12), size);
        assert_eq!(12, segment.overwrite_head(&mut sink).unwrap());
        assert_eq!(streamed.len() as u64, sink.position());

        let data = sink.into_inner().into_inner();
        assert_eq!(streamed.len(), data.len());
        assert_eq!(&streamed[12..], &data[12..]);

        let header = ElementStream::new(Cursor::new(data.clone())).read_header().unwrap().unwrap();
        assert_eq!(size, header.size);
        assert_eq!(8, header.size_length);

        let read_back = read_all(data);
        assert_eq!(vec![Element::from(segment)], read_back);
    }

    #[test]
    pub fn unknown_sizes_end_at_upper_elements() {
        let mut segment = MasterElement::new(test_schema(), SEGMENT).unwrap();
        segment.set_size_infinite(true);
        for timecode in [0, 1000] {
            let mut unknown = cluster(timecode);
            unknown.set_size_infinite(true);
            segment.push(unknown).unwrap();
        }
        let tracks = segment.add_new_child::<MasterElement>(TRACKS).unwrap();
        *tracks.add_new_child::<MasterElement>(TRACK_ENTRY).unwrap().get_child::<u64>(TRACK_NUMBER).unwrap() = 1;

        let mut sink = ElementSink::new(Vec::new());
        let mut document = vec![segment, ebml()];
        for master in document.iter_mut() {
            master.render(&mut sink, false, false).expect("Test shouldn't error");
        }
        assert_eq!(ElementSize::Unknown, document[0].size());

        let read_back = read_all(sink.into_inner());
        let segment = read_back[0].as_master().unwrap();
        assert_eq!(vec![CLUSTER, CLUSTER, TRACKS], segment.iter().map(Element::id).collect::<Vec<_>>());
        assert!(segment.find_children::<MasterElement>(CLUSTER).unwrap().iter().all(|cluster| !cluster.is_finite_size() && cluster.len() == 2));

        let expected: Vec<Element> = document.into_iter().map(Element::from).collect();
        assert_eq!(expected, read_back);
    }

    #[test]
    pub fn unknown_size_stops_at_parent_end() {
        let mut segment = MasterElement::new(test_schema(), SEGMENT).unwrap();
        let mut unknown = cluster(7);
        unknown.set_size_infinite(true);
        segment.push(unknown).unwrap();

        let mut sink = ElementSink::new(Vec::new());
        let mut document = vec![segment, ebml()];
        for master in document.iter_mut() {
            master.render(&mut sink, false, false).expect("Test shouldn't error");
        }
        assert!(document[0].size().is_known());

        let read_back = read_all(sink.into_inner());
        assert_eq!(2, read_back.len());
        let cluster = read_back[0].as_master().unwrap().find_child::<MasterElement>(CLUSTER).unwrap().unwrap();
        assert!(!cluster.is_finite_size());
        assert_eq!(Some(&7), cluster.find_child::<u64>(TIMECODE).unwrap());
        assert_eq!(EBML, read_back[1].id());
    }

    #[test]
    pub fn unknown_size_width_is_kept_intact() {
        let data = vec![
            0x18, 0x53, 0x80, 0x67, 0xFF,
            0x15, 0x49, 0xA9, 0x66, 0x85,
            0x2A, 0xD7, 0xB1, 0x81, 0x01,
        ];
        let mut read_back = read_all(data.clone());
        let segment = read_back[0].as_master_mut().unwrap();
        assert!(!segment.is_finite_size());

        let mut sink = ElementSink::new(Vec::new());
        segment.render(&mut sink, true, false).unwrap();
        assert_eq!(data, sink.into_inner());

        let mut sink = ElementSink::new(Vec::new());
        segment.render(&mut sink, false, false).unwrap();
        let rewritten = sink.into_inner();
        assert_eq!(data.len() + 7, rewritten.len());
        assert_eq!(&UNKNOWN_SIZE, &rewritten[4..12]);
        assert_eq!(&data[5..], &rewritten[12..]);
    }
}
