use solarmap::planner::{PlannerConfig, plan_reads};
use solarmap::registers::{Encoding, InverterModel, RegisterDescriptor, RegisterKind, RegisterMap};

fn reg(name: &str, address: u16, encoding: Encoding) -> RegisterDescriptor {
    RegisterDescriptor::new(name, address, encoding).models(&[InverterModel::H1])
}

#[test]
fn adjacent_registers_share_a_block() {
    let a = reg("A", 10, Encoding::UnsignedInt16);
    let b = reg("B", 11, Encoding::UnsignedInt16);
    let c = reg("C", 50, Encoding::UnsignedInt16);
    let plan = plan_reads(&PlannerConfig::new(16).unwrap(), &[&a, &b, &c]);

    let shape: Vec<(u16, u16, Vec<&str>)> = plan
        .iter()
        .map(|block| (block.start, block.end() as u16, block.names()))
        .collect();
    assert_eq!(
        shape,
        vec![(10, 12, vec!["A", "B"]), (50, 51, vec!["C"])]
    );
}

#[test]
fn plan_is_deterministic_regardless_of_request_order() {
    let map = RegisterMap::builtin().unwrap();
    let mut descriptors = map.registers.descriptors_for_model(InverterModel::Kh);
    let config = PlannerConfig::new(20).unwrap();
    let forward = plan_reads(&config, &descriptors);
    descriptors.reverse();
    let backward = plan_reads(&config, &descriptors);
    assert_eq!(forward, backward);
}

#[test]
fn every_descriptor_lands_in_exactly_one_bounded_block() {
    let map = RegisterMap::builtin().unwrap();
    let descriptors = map.registers.descriptors_for_model(InverterModel::H1);
    for size in [2u16, 7, 16, 125] {
        let plan = plan_reads(&PlannerConfig::new(size).unwrap(), &descriptors);
        let mut seen: Vec<&str> = plan.iter().flat_map(|b| b.names()).collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected, "max_block_size {size}");

        for block in &plan {
            assert!(block.length <= size);
            for d in &block.descriptors {
                assert_eq!(d.kind, block.kind);
                assert!(d.address >= block.start);
                assert!(d.end() <= block.end());
            }
        }
    }
}

#[test]
fn holding_blocks_come_before_input_blocks() {
    let map = RegisterMap::builtin().unwrap();
    let descriptors = map.registers.descriptors_for_model(InverterModel::H1);
    let plan = plan_reads(&PlannerConfig::new(125).unwrap(), &descriptors);
    let kinds: Vec<RegisterKind> = plan.iter().map(|b| b.kind).collect();
    let first_input = kinds
        .iter()
        .position(|k| *k == RegisterKind::Input)
        .unwrap();
    assert!(kinds[..first_input].iter().all(|k| *k == RegisterKind::Holding));
    assert!(kinds[first_input..].iter().all(|k| *k == RegisterKind::Input));
}
