//! Segment Order Allocator - 顺序号分配器
//!
//! 每个 Job 一个分配器实例，记录已占用的顺序号。
//! 持久化层在事务中根据已有槽位重建分配器，完成读-改-写，避免并发修改产生重复顺序号。

use std::collections::BTreeSet;
use uuid::Uuid;

use super::{SegmentSlot, SegmentType};
use crate::domain::errors::DomainError;

/// 单个 Job 的顺序号分配器
#[derive(Debug, Clone)]
pub struct SegmentOrderAllocator {
    job_id: Uuid,
    used: BTreeSet<u8>,
}

/// 重排输入
#[derive(Debug, Clone)]
pub struct RepackEntry {
    pub segment_id: Uuid,
    pub segment_type: SegmentType,
    pub chapter_index: i64,
    pub source_order: i64,
    pub included: bool,
}

impl SegmentOrderAllocator {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            used: BTreeSet::new(),
        }
    }

    /// 根据已分配的槽位重建
    pub fn from_slots(job_id: Uuid, slots: impl IntoIterator<Item = SegmentSlot>) -> Self {
        Self {
            job_id,
            used: slots.into_iter().map(|s| s.order()).collect(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// 分配该类型区间内最小的空闲顺序号
    pub fn allocate(&mut self, segment_type: SegmentType) -> Result<SegmentSlot, DomainError> {
        let order = segment_type
            .range()
            .find(|order| !self.used.contains(order))
            .ok_or(DomainError::CapacityExceeded {
                segment_type,
                capacity: segment_type.capacity(),
            })?;

        self.used.insert(order);
        SegmentSlot::new(segment_type, order)
    }

    pub fn release(&mut self, slot: SegmentSlot) {
        self.used.remove(&slot.order());
    }

    /// 类型变更：在新类型区间内重新分配，而不是仅做校验
    ///
    /// 新区间已满时返回 CapacityExceeded，原槽位保持不变。
    pub fn reallocate(
        &mut self,
        current: SegmentSlot,
        new_type: SegmentType,
    ) -> Result<SegmentSlot, DomainError> {
        if current.segment_type() == new_type {
            return Ok(current);
        }
        let slot = self.allocate(new_type)?;
        self.release(current);
        Ok(slot)
    }

    /// 写入前复核 (类型, 顺序号)：必须落在类型区间内，且没有被其他片段占用
    pub fn validate(&self, segment_type: SegmentType, order: u8) -> Result<SegmentSlot, DomainError> {
        let slot = SegmentSlot::new(segment_type, order)?;
        if self.used.contains(&order) {
            return Err(DomainError::OrderInUse { order });
        }
        Ok(slot)
    }

    /// 复核通过后占用该顺序号
    pub fn assign(&mut self, segment_type: SegmentType, order: u8) -> Result<SegmentSlot, DomainError> {
        let slot = self.validate(segment_type, order)?;
        self.used.insert(order);
        Ok(slot)
    }

    /// 审批时重新发放各类型的槽位
    ///
    /// 每种类型从区间下界开始依次发放：先按 chapter_index 排列的已纳入片段，
    /// 再是被排除的片段。结果中顺序号在 Job 内唯一。
    pub fn repack(entries: &[RepackEntry]) -> Result<Vec<(Uuid, SegmentSlot)>, DomainError> {
        let mut result = Vec::with_capacity(entries.len());

        for segment_type in SegmentType::ALL {
            let mut members: Vec<&RepackEntry> = entries
                .iter()
                .filter(|e| e.segment_type == segment_type)
                .collect();

            if members.len() > segment_type.capacity() as usize {
                return Err(DomainError::CapacityExceeded {
                    segment_type,
                    capacity: segment_type.capacity(),
                });
            }

            members.sort_by_key(|e| (!e.included, e.chapter_index, e.source_order));

            let start = *segment_type.range().start();
            for (offset, entry) in members.into_iter().enumerate() {
                let slot = SegmentSlot::new(segment_type, start + offset as u8)?;
                result.push((entry.segment_id, slot));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_body_chapter_capacity() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());

        for i in 0..70u8 {
            let slot = allocator.allocate(SegmentType::BodyChapter).unwrap();
            assert_eq!(slot.order(), 10 + i);
        }

        let err = allocator.allocate(SegmentType::BodyChapter).unwrap_err();
        assert_eq!(
            err,
            DomainError::CapacityExceeded {
                segment_type: SegmentType::BodyChapter,
                capacity: 70
            }
        );
    }

    #[test]
    fn test_never_duplicates_orders() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());
        let mut seen = HashSet::new();

        for ty in SegmentType::ALL {
            while let Ok(slot) = allocator.allocate(ty) {
                assert!(seen.insert(slot.order()), "duplicate order {}", slot.order());
            }
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_single_slot_types() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());
        assert_eq!(allocator.allocate(SegmentType::OpeningCredits).unwrap().order(), 0);
        assert_eq!(allocator.allocate(SegmentType::ClosingCredits).unwrap().order(), 98);
        assert_eq!(allocator.allocate(SegmentType::RetailSample).unwrap().order(), 99);
        assert!(allocator.allocate(SegmentType::RetailSample).is_err());
    }

    #[test]
    fn test_reallocate_moves_into_new_range() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());
        let chapter = allocator.allocate(SegmentType::BodyChapter).unwrap();

        let moved = allocator
            .reallocate(chapter, SegmentType::BackMatter)
            .unwrap();
        assert_eq!(moved.segment_type(), SegmentType::BackMatter);
        assert_eq!(moved.order(), 80);

        // 原槽位已释放
        assert_eq!(allocator.allocate(SegmentType::BodyChapter).unwrap().order(), 10);
    }

    #[test]
    fn test_reallocate_keeps_slot_when_full() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());
        allocator.allocate(SegmentType::OpeningCredits).unwrap();
        let chapter = allocator.allocate(SegmentType::BodyChapter).unwrap();

        assert!(allocator
            .reallocate(chapter, SegmentType::OpeningCredits)
            .is_err());
        // 10 仍被原片段占用
        assert_eq!(chapter.order(), 10);
        assert_eq!(allocator.allocate(SegmentType::BodyChapter).unwrap().order(), 11);
    }

    #[test]
    fn test_validate_rejects_taken_or_out_of_range_order() {
        let mut allocator = SegmentOrderAllocator::new(Uuid::new_v4());
        allocator.allocate(SegmentType::BodyChapter).unwrap();

        assert_eq!(
            allocator.validate(SegmentType::BodyChapter, 10),
            Err(DomainError::OrderInUse { order: 10 })
        );
        assert!(matches!(
            allocator.validate(SegmentType::BackMatter, 10),
            Err(DomainError::OrderOutOfRange { .. })
        ));

        let slot = allocator.assign(SegmentType::BodyChapter, 12).unwrap();
        assert_eq!(slot.order(), 12);
        assert_eq!(
            allocator.assign(SegmentType::BodyChapter, 12),
            Err(DomainError::OrderInUse { order: 12 })
        );
        // validate 不占用
        allocator.validate(SegmentType::BodyChapter, 11).unwrap();
        assert_eq!(allocator.allocate(SegmentType::BodyChapter).unwrap().order(), 11);
    }

    #[test]
    fn test_repack_orders_included_by_chapter_index() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let entries = vec![
            RepackEntry {
                segment_id: a,
                segment_type: SegmentType::BodyChapter,
                chapter_index: 2,
                source_order: 0,
                included: true,
            },
            RepackEntry {
                segment_id: b,
                segment_type: SegmentType::BodyChapter,
                chapter_index: 0,
                source_order: 1,
                included: false,
            },
            RepackEntry {
                segment_id: c,
                segment_type: SegmentType::BodyChapter,
                chapter_index: 1,
                source_order: 2,
                included: true,
            },
        ];

        let slots = SegmentOrderAllocator::repack(&entries).unwrap();
        let order_of = |id: Uuid| slots.iter().find(|(s, _)| *s == id).unwrap().1.order();
        assert_eq!(order_of(c), 10);
        assert_eq!(order_of(a), 11);
        assert_eq!(order_of(b), 12);
    }
}
