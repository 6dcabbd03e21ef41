mod test_schema;

pub mod corrupt_data_tests {
    use std::io::Cursor;

    use ebml_master::error::{MasterError, StructuralError};
    use ebml_master::tools::UNKNOWN_SIZE;
    use ebml_master::{AllowableErrors, ElementReader, ElementSink, LeafElement, MasterElement, ReadOptions};

    use super::test_schema::*;

    fn strict() -> ReadOptions {
        ReadOptions::default().allow_errors(&[])
    }

    fn reader(data: Vec<u8>, options: ReadOptions) -> ElementReader<Cursor<Vec<u8>>> {
        ElementReader::new(Cursor::new(data), test_schema(), options)
    }

    fn render(masters: Vec<MasterElement>) -> Vec<u8> {
        let mut sink = ElementSink::new(Vec::new());
        for mut master in masters {
            master.render(&mut sink, false, false).expect("Test shouldn't error");
        }
        sink.into_inner()
    }

    fn segment_with_cluster_child(child: LeafElement) -> Vec<u8> {
        let schema = test_schema();
        let mut segment = MasterElement::new(schema, SEGMENT).unwrap();
        let cluster = segment.add_new_child::<MasterElement>(CLUSTER).unwrap();
        *cluster.get_child::<u64>(TIMECODE).unwrap() = 5;
        cluster.push(child).unwrap();

        let mut ebml = MasterElement::new(schema, EBML).unwrap();
        ebml.process_mandatory().unwrap();
        render(vec![segment, ebml])
    }

    #[test]
    pub fn unknown_ids_become_dummies() {
        let data = segment_with_cluster_child(LeafElement::binary(0x4F00, &[0xAA]));
        let elements = reader(data.clone(), ReadOptions::default()).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(2, elements.len());

        let cluster = elements[0].as_master().unwrap().find_first(CLUSTER).unwrap().as_master().unwrap();
        let dummy = cluster.get(1).unwrap().as_leaf().unwrap();
        assert!(dummy.is_dummy());
        assert_eq!(0x4F00, dummy.id());

        let mut sink = ElementSink::new(Vec::new());
        for mut element in elements {
            element.render(&mut sink, true, false).unwrap();
        }
        assert_eq!(data, sink.into_inner());
    }

    #[test]
    pub fn error_on_unknown_ids() {
        let data = segment_with_cluster_child(LeafElement::binary(0x4F00, &[0xAA]));
        let mut reader = reader(data, strict());
        assert!(matches!(reader.next().unwrap(), Err(MasterError::UnknownElement { id: 0x4F00, position: 13, depth: 1 })));
        assert_eq!(EBML, reader.next().unwrap().unwrap().id());
        assert!(reader.next().is_none());
    }

    #[test]
    pub fn misplaced_elements_are_not_claimed() {
        let data = segment_with_cluster_child(LeafElement::unsigned_int(TRACK_NUMBER, 1));

        let elements = reader(data.clone(), ReadOptions::default()).collect::<Result<Vec<_>, _>>().unwrap();
        let cluster = elements[0].as_master().unwrap().find_first(CLUSTER).unwrap().as_master().unwrap();
        assert!(cluster.get(1).unwrap().as_leaf().unwrap().is_dummy());

        let mut reader = reader(data, strict());
        assert!(matches!(reader.next().unwrap(), Err(MasterError::UnknownElement { id: TRACK_NUMBER, depth: 1, .. })));
        assert!(reader.next().unwrap().is_ok());
    }

    #[test]
    pub fn unknown_top_level_ids() {
        let mut data = vec![0x4F, 0x00, 0x82, 0x01, 0x02];
        data.extend(segment_with_cluster_child(LeafElement::binary(SIMPLE_BLOCK, &[0x00])));

        let elements = reader(data.clone(), ReadOptions::default()).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(3, elements.len());
        assert!(elements[0].as_leaf().unwrap().is_dummy());

        let results: Vec<_> = reader(data, strict()).collect();
        assert_eq!(3, results.len());
        assert!(matches!(results[0], Err(MasterError::UnknownElement { id: 0x4F00, position: 0, depth: 0 })));
        assert_eq!(SEGMENT, results[1].as_ref().unwrap().id());
    }

    fn oversized_child() -> Vec<u8> {
        vec![
            0x18, 0x53, 0x80, 0x67, 0x85,
            0x1F, 0x43, 0xB6, 0x75, 0x83,
            0xE7, 0x81, 0x07,
        ]
    }

    #[test]
    pub fn error_on_oversized_children() {
        let mut reader = reader(oversized_child(), ReadOptions::default());
        assert!(matches!(
            reader.next().unwrap(),
            Err(MasterError::Structural { position: 5, kind: StructuralError::OversizedChild { id: CLUSTER, size: 3, available: 0 } })
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    pub fn allow_errors_oversized_children() {
        let options = ReadOptions::default().allow_errors(&[AllowableErrors::UnknownElements, AllowableErrors::OversizedChildren]);
        let elements = reader(oversized_child(), options).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(1, elements.len());
        let cluster = elements[0].as_master().unwrap().find_child::<MasterElement>(CLUSTER).unwrap().unwrap();
        assert_eq!(Some(&7), cluster.find_child::<u64>(TIMECODE).unwrap());
    }

    #[test]
    pub fn truncated_data() {
        let mut data = segment_with_cluster_child(LeafElement::binary(SIMPLE_BLOCK, &[0x00, 0x01, 0x02, 0x03]));
        let ebml_length = 4 + 1 + 4 + 7;
        data.truncate(data.len() - ebml_length - 2);

        let mut reader = reader(data, ReadOptions::default());
        assert!(matches!(reader.next().unwrap(), Err(MasterError::Structural { kind: StructuralError::UnexpectedEof, .. })));
        assert!(reader.next().is_none());
    }

    #[test]
    pub fn unknown_sized_leaves_are_rejected() {
        let mut data = vec![0x18, 0x53, 0x80, 0x67, 0x8F, 0x15, 0x49, 0xA9, 0x66, 0x8A, 0x7B, 0xA9];
        data.extend_from_slice(&UNKNOWN_SIZE);

        let mut reader = reader(data, ReadOptions::default());
        assert!(matches!(
            reader.next().unwrap(),
            Err(MasterError::Structural { position: 10, kind: StructuralError::UnknownSizeLeaf { id: TITLE } })
        ));
    }

    #[test]
    pub fn nesting_depth_is_limited() {
        let mut segment = MasterElement::new(test_schema(), SEGMENT).unwrap();
        let tracks = segment.add_new_child::<MasterElement>(TRACKS).unwrap();
        let entry = tracks.add_new_child::<MasterElement>(TRACK_ENTRY).unwrap();
        entry.process_mandatory().unwrap();
        let data = render(vec![segment]);

        let mut shallow = reader(data.clone(), ReadOptions::default().with_max_depth(2));
        assert!(matches!(shallow.next().unwrap(), Err(MasterError::Structural { kind: StructuralError::NestingTooDeep(2), .. })));

        let elements = reader(data, ReadOptions::default().with_max_depth(3)).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(1, elements.len());
    }

    #[test]
    pub fn invalid_ids_end_iteration() {
        let mut reader = reader(vec![0x00, 0x81, 0x00], ReadOptions::default());
        assert!(matches!(reader.next().unwrap(), Err(MasterError::Structural { position: 0, kind: StructuralError::InvalidId })));
        assert!(reader.next().is_none());
    }

    #[test]
    pub fn malformed_checksum_elements() {
        let data = vec![0x18, 0x53, 0x80, 0x67, 0x85, 0xBF, 0x83, 0x01, 0x02, 0x03];
        let mut reader = reader(data, ReadOptions::default());
        assert!(matches!(
            reader.next().unwrap(),
            Err(MasterError::Structural { position: 5, kind: StructuralError::InvalidChecksumElement(3) })
        ));
    }

    #[test]
    pub fn checksum_mismatch_is_detected() {
        let mut cluster = MasterElement::new(test_schema(), CLUSTER).unwrap();
        *cluster.get_child::<u64>(TIMECODE).unwrap() = 9;
        cluster.enable_checksum(true);
        let mut segment = MasterElement::new(test_schema(), SEGMENT).unwrap();
        segment.push(cluster).unwrap();

        let mut data = render(vec![segment]);
        let last = data.len() - 1;
        data[last] ^= 0x01;

        let elements = reader(data, ReadOptions::default()).collect::<Result<Vec<_>, _>>().unwrap();
        let cluster = elements[0].as_master().unwrap().find_child::<MasterElement>(CLUSTER).unwrap().unwrap();
        assert_eq!(Some(&8), cluster.find_child::<u64>(TIMECODE).unwrap());
        assert!(matches!(cluster.check_checksum(), Err(MasterError::ChecksumMismatch { id: CLUSTER, .. })));
    }
}
