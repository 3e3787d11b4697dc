//! Attribute storage and access control for a single cluster

use crate::error::{AccessKind, Missing, ZclError};
use zcl_types::{AttrValue, DataType};

/// Attribute access bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(u8);

impl Access {
    pub const READ: Access = Access(0x01);
    pub const WRITE: Access = Access(0x02);
    pub const REPORTING: Access = Access(0x04);
    pub const SCENE: Access = Access(0x10);

    pub const READ_ONLY: Access = Access::READ;
    pub const READ_WRITE: Access = Access(0x01 | 0x02);
    pub const READ_REPORTING: Access = Access(0x01 | 0x04);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

/// A single typed attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    id: u16,
    data_type: DataType,
    access: Access,
    value: AttrValue,
}

impl Attribute {
    /// Attribute whose declared type is taken from its initial value
    #[must_use]
    pub fn new(id: u16, access: Access, value: AttrValue) -> Self {
        Self {
            id,
            data_type: value.data_type(),
            access,
            value,
        }
    }

    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    #[must_use]
    pub fn value(&self) -> &AttrValue {
        &self.value
    }

    fn check_value(&self, value: &AttrValue) -> Result<(), ZclError> {
        check_value(self.data_type, value)
    }
}

/// Declared type matches and the value fits on the wire
fn check_value(data_type: DataType, value: &AttrValue) -> Result<(), ZclError> {
    if value.data_type() != data_type {
        return Err(ZclError::TypeMismatch {
            expected: data_type,
            actual: value.data_type(),
        });
    }
    value.check_encodable()?;
    Ok(())
}

/// Last reported value and reportable change an update is measured against
#[derive(Debug, Clone, Copy)]
pub struct ReportBaseline<'a> {
    pub reported_value: Option<&'a AttrValue>,
    pub delta: Option<&'a AttrValue>,
}

impl ReportBaseline<'_> {
    /// Whether `value` differs enough from the last reported value
    #[must_use]
    pub fn is_reportable(&self, value: &AttrValue) -> bool {
        is_reportable_change(value, self.reported_value, self.delta)
    }
}

/// Reportable-change rule.
///
/// Nothing reported yet: always reportable. Discrete types: any difference.
/// Analog types: a non-zero difference of at least `delta`.
#[must_use]
pub fn is_reportable_change(
    value: &AttrValue,
    reported: Option<&AttrValue>,
    delta: Option<&AttrValue>,
) -> bool {
    let Some(reported) = reported else {
        return true;
    };

    if !value.data_type().is_analog() {
        return value != reported;
    }

    match (value.as_f64(), reported.as_f64()) {
        // NaN is the invalid marker: entering or leaving it is a change
        (Some(new), Some(old)) if new.is_nan() || old.is_nan() => new.is_nan() != old.is_nan(),
        (Some(new), Some(old)) => {
            let diff = (new - old).abs();
            let threshold = delta
                .and_then(AttrValue::as_f64)
                .filter(|d| !d.is_nan())
                .unwrap_or(0.0)
                .abs();
            diff > 0.0 && diff >= threshold
        }
        _ => value != reported,
    }
}

/// Attributes of one cluster, in definition order
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    cluster_id: u16,
    attrs: Vec<Attribute>,
}

impl AttributeRegistry {
    #[must_use]
    pub fn new(cluster_id: u16) -> Self {
        Self {
            cluster_id,
            attrs: Vec::new(),
        }
    }

    #[must_use]
    pub fn cluster_id(&self) -> u16 {
        self.cluster_id
    }

    /// Register an attribute
    pub fn define(
        &mut self,
        attr_id: u16,
        data_type: DataType,
        access: Access,
        initial: AttrValue,
    ) -> Result<(), ZclError> {
        if self.contains(attr_id) {
            return Err(ZclError::DuplicateAttribute {
                cluster_id: self.cluster_id,
                attr_id,
            });
        }
        check_value(data_type, &initial)?;
        self.attrs.push(Attribute {
            id: attr_id,
            data_type,
            access,
            value: initial,
        });
        Ok(())
    }

    /// Register a prebuilt attribute
    pub fn insert(&mut self, attr: Attribute) -> Result<(), ZclError> {
        self.define(attr.id, attr.data_type, attr.access, attr.value)
    }

    /// Read the current value; requires the READ bit
    pub fn read(&self, attr_id: u16) -> Result<&AttrValue, ZclError> {
        let attr = self.lookup(attr_id)?;
        if !attr.access.contains(Access::READ) {
            return Err(ZclError::AccessDenied {
                attr_id,
                access: AccessKind::Read,
            });
        }
        Ok(&attr.value)
    }

    /// Remote write; requires the WRITE bit.
    ///
    /// Returns whether the new value is a reportable change against
    /// `baseline`, or whether it changed at all when there is none.
    pub fn write(
        &mut self,
        attr_id: u16,
        value: AttrValue,
        baseline: Option<ReportBaseline<'_>>,
    ) -> Result<bool, ZclError> {
        let attr = self.lookup_mut(attr_id)?;
        if !attr.access.contains(Access::WRITE) {
            return Err(ZclError::AccessDenied {
                attr_id,
                access: AccessKind::Write,
            });
        }
        attr.check_value(&value)?;
        Ok(Self::apply(attr, value, baseline))
    }

    /// Local write from the application; ignores the WRITE bit but keeps
    /// the declared type
    pub fn set(
        &mut self,
        attr_id: u16,
        value: AttrValue,
        baseline: Option<ReportBaseline<'_>>,
    ) -> Result<bool, ZclError> {
        let attr = self.lookup_mut(attr_id)?;
        attr.check_value(&value)?;
        Ok(Self::apply(attr, value, baseline))
    }

    fn apply(attr: &mut Attribute, value: AttrValue, baseline: Option<ReportBaseline<'_>>) -> bool {
        let reportable = match baseline {
            Some(baseline) => baseline.is_reportable(&value),
            None => is_reportable_change(&value, Some(&attr.value), None),
        };
        attr.value = value;
        reportable
    }

    #[must_use]
    pub fn get(&self, attr_id: u16) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.id == attr_id)
    }

    #[must_use]
    pub fn contains(&self, attr_id: u16) -> bool {
        self.get(attr_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn lookup(&self, attr_id: u16) -> Result<&Attribute, ZclError> {
        self.get(attr_id).ok_or(ZclError::NotFound(Missing::Attribute {
            cluster_id: self.cluster_id,
            attr_id,
        }))
    }

    fn lookup_mut(&mut self, attr_id: u16) -> Result<&mut Attribute, ZclError> {
        let cluster_id = self.cluster_id;
        self.attrs
            .iter_mut()
            .find(|a| a.id == attr_id)
            .ok_or(ZclError::NotFound(Missing::Attribute {
                cluster_id,
                attr_id,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcl_types::U24;

    fn registry() -> AttributeRegistry {
        let mut reg = AttributeRegistry::new(0x0008);
        reg.define(0x0000, DataType::U8, Access::READ_REPORTING, AttrValue::U8(10))
            .unwrap();
        reg.define(0x0010, DataType::U16, Access::READ_WRITE, AttrValue::U16(0))
            .unwrap();
        reg
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut reg = registry();
        reg.write(0x0010, AttrValue::U16(500), None).unwrap();
        assert_eq!(reg.read(0x0010).unwrap(), &AttrValue::U16(500));
    }

    #[test]
    fn test_denied_write_keeps_prior_value() {
        let mut reg = registry();
        let result = reg.write(0x0000, AttrValue::U8(99), None);
        assert!(matches!(
            result,
            Err(ZclError::AccessDenied {
                access: AccessKind::Write,
                ..
            })
        ));
        assert_eq!(reg.read(0x0000).unwrap(), &AttrValue::U8(10));
    }

    #[test]
    fn test_type_mismatch_keeps_prior_value() {
        let mut reg = registry();
        let result = reg.write(0x0010, AttrValue::U32(500), None);
        assert!(matches!(
            result,
            Err(ZclError::TypeMismatch {
                expected: DataType::U16,
                actual: DataType::U32
            })
        ));
        assert_eq!(reg.read(0x0010).unwrap(), &AttrValue::U16(0));
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut reg = registry();
        let result = reg.define(0x0000, DataType::U8, Access::READ_ONLY, AttrValue::U8(1));
        assert!(matches!(
            result,
            Err(ZclError::DuplicateAttribute {
                cluster_id: 0x0008,
                attr_id: 0x0000
            })
        ));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_define_rejects_mismatched_initial_value() {
        let mut reg = AttributeRegistry::new(0x0000);
        let result = reg.define(0x0001, DataType::U24, Access::READ_ONLY, AttrValue::U32(1));
        assert!(matches!(result, Err(ZclError::TypeMismatch { .. })));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_read_denied_without_read_bit() {
        let mut reg = AttributeRegistry::new(0x0000);
        reg.define(0x0001, DataType::U8, Access::WRITE, AttrValue::U8(0))
            .unwrap();
        assert!(matches!(
            reg.read(0x0001),
            Err(ZclError::AccessDenied {
                access: AccessKind::Read,
                ..
            })
        ));
    }

    #[test]
    fn test_read_unknown_attribute() {
        let reg = registry();
        assert!(matches!(
            reg.read(0x4000),
            Err(ZclError::NotFound(Missing::Attribute { attr_id: 0x4000, .. }))
        ));
    }

    #[test]
    fn test_set_bypasses_write_bit() {
        let mut reg = registry();
        assert!(reg.set(0x0000, AttrValue::U8(11), None).unwrap());
        assert_eq!(reg.read(0x0000).unwrap(), &AttrValue::U8(11));
    }

    #[test]
    fn test_write_reports_change_against_baseline() {
        let mut reg = registry();
        let reported = AttrValue::U16(100);
        let delta = AttrValue::U16(5);
        let baseline = ReportBaseline {
            reported_value: Some(&reported),
            delta: Some(&delta),
        };
        assert!(!reg.write(0x0010, AttrValue::U16(103), Some(baseline)).unwrap());
        assert!(reg.write(0x0010, AttrValue::U16(106), Some(baseline)).unwrap());
        assert!(reg.write(0x0010, AttrValue::U16(95), Some(baseline)).unwrap());
    }

    #[test]
    fn test_discrete_change_ignores_delta() {
        let reported = AttrValue::Enum8(1);
        let delta = AttrValue::Enum8(10);
        assert!(is_reportable_change(
            &AttrValue::Enum8(2),
            Some(&reported),
            Some(&delta)
        ));
        assert!(!is_reportable_change(
            &AttrValue::Enum8(1),
            Some(&reported),
            Some(&delta)
        ));
    }

    #[test]
    fn test_zero_delta_needs_actual_change() {
        let reported = AttrValue::U24(U24::new(7).unwrap());
        assert!(!is_reportable_change(
            &AttrValue::U24(U24::new(7).unwrap()),
            Some(&reported),
            None
        ));
        assert!(is_reportable_change(
            &AttrValue::U24(U24::new(8).unwrap()),
            Some(&reported),
            None
        ));
    }

    #[test]
    fn test_access_bits() {
        assert!(Access::READ_WRITE.contains(Access::WRITE));
        assert!(!Access::READ_REPORTING.contains(Access::WRITE));
        assert_eq!((Access::READ | Access::SCENE).bits(), 0x11);
    }

    #[test]
    fn test_overlong_string_write_keeps_prior_value() {
        let mut reg = AttributeRegistry::new(0x0000);
        reg.define(
            0x0005,
            DataType::CharString,
            Access::READ_WRITE,
            AttrValue::CharString("lamp".into()),
        )
        .unwrap();

        let err = reg
            .write(0x0005, AttrValue::CharString("x".repeat(255)), None)
            .unwrap_err();
        assert_eq!(err.status(), zcl_types::ZclStatus::InvalidValue);
        assert_eq!(
            reg.read(0x0005).unwrap(),
            &AttrValue::CharString("lamp".into())
        );

        reg.write(0x0005, AttrValue::CharString("x".repeat(254)), None)
            .unwrap();
    }

    #[test]
    fn test_overlong_initial_string_rejected() {
        let mut reg = AttributeRegistry::new(0x0000);
        let result = reg.define(
            0x4000,
            DataType::OctetString,
            Access::READ_ONLY,
            AttrValue::OctetString(vec![0; 300]),
        );
        assert!(matches!(result, Err(ZclError::Codec(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_invalid_float_transitions_are_reportable() {
        let nan = AttrValue::Single(f32::NAN);
        let value = AttrValue::Single(21.5);
        let delta = AttrValue::Single(1.0);

        assert!(is_reportable_change(&value, Some(&nan), None));
        assert!(is_reportable_change(&value, Some(&nan), Some(&delta)));
        assert!(is_reportable_change(&nan, Some(&value), Some(&delta)));
        assert!(!is_reportable_change(&nan, Some(&nan), None));
    }

    #[test]
    fn test_repeated_invalid_float_is_not_a_change() {
        let mut reg = AttributeRegistry::new(0x0402);
        reg.define(
            0x0000,
            DataType::Single,
            Access::READ_WRITE,
            AttrValue::Single(f32::NAN),
        )
        .unwrap();
        assert!(!reg.set(0x0000, AttrValue::Single(f32::NAN), None).unwrap());
        assert!(reg.set(0x0000, AttrValue::Single(20.0), None).unwrap());
    }
}
