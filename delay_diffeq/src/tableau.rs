/// Coefficients of an embedded Runge-Kutta pair with a continuous extension.
///
/// `a`, `b` and `c` are the classical Butcher arrays. `e` is the embedded
/// error-estimate row and `d` the dense-output row; both are indexed by
/// stage, with the last entry applying to the derivative evaluated at the
/// step end point (the FSAL evaluation).
pub struct ButcherTableau<const STAGES: usize> {
    pub a: [[f64; STAGES]; STAGES],
    pub b: [f64; STAGES],
    pub c: [f64; STAGES],
    pub e: [f64; STAGES],
    pub d: [f64; STAGES],
}

impl ButcherTableau<7> {
    // usage is ButcherTableau::<7>::DOPRI5
    pub const DOPRI5: Self = Self {
        a: [
            [0., 0., 0., 0., 0., 0., 0.],
            [1. / 5., 0., 0., 0., 0., 0., 0.],
            [3. / 40., 9. / 40., 0., 0., 0., 0., 0.],
            [44. / 45., -56. / 15., 32. / 9., 0., 0., 0., 0.],
            [
                19372. / 6561.,
                -25360. / 2187.,
                64448. / 6561.,
                -212. / 729.,
                0.,
                0.,
                0.,
            ],
            [
                9017. / 3168.,
                -355. / 33.,
                46732. / 5247.,
                49. / 176.,
                -5103. / 18656.,
                0.,
                0.,
            ],
            [
                35. / 384.,
                0.,
                500. / 1113.,
                125. / 192.,
                -2187. / 6784.,
                11. / 84.,
                0.,
            ],
        ],
        b: [
            35. / 384.,
            0.,
            500. / 1113.,
            125. / 192.,
            -2187. / 6784.,
            11. / 84.,
            0.,
        ],
        c: [0., 1. / 5., 3. / 10., 4. / 5., 8. / 9., 1., 1.],
        e: [
            71. / 57600.,
            0.,
            -71. / 16695.,
            71. / 1920.,
            -17253. / 339200.,
            22. / 525.,
            -1. / 40.,
        ],
        d: [
            -12715105075. / 11282082432.,
            0.,
            87487479700. / 32700410799.,
            -10690763975. / 1880347072.,
            701980252875. / 199316789632.,
            -1453857185. / 822651844.,
            69997945. / 29380423.,
        ],
    };
}
