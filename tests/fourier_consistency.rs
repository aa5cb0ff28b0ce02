use approx::assert_abs_diff_eq;
use carr_madan_option::black::implied_volatility;
use carr_madan_option::call_transform::EuropeanCallFourierTransform;
use carr_madan_option::characteristic_exponent::{
    CgmyCharacteristicExponent, GaussianCharacteristicExponent, HestonCharacteristicExponent,
    HestonParameters, IntegratedCirTimeChange, TimeChangedCharacteristicExponent,
};
use carr_madan_option::fft_pricer::{FftGrid, FftPricer};
use carr_madan_option::fourier_pricer::FourierPricer;
use carr_madan_option::integral_limit::IntegralLimitCalculator;
use carr_madan_option::option_data::{ForwardOption, ForwardStrikeGrid};

#[test]
fn fft_and_quadrature_agree_in_volatility() {
    let heston = HestonCharacteristicExponent::new(HestonParameters {
        kappa: 1.0,
        theta: 0.36 * 0.36,
        vol0: 0.36 * 0.36,
        omega: 0.001,
        rho: -0.3,
    })
    .unwrap();
    let (forward, discount_factor, maturity) = (0.04, 0.93, 2.0);
    let request = ForwardStrikeGrid::new(forward, discount_factor, maturity, true, 21, 0.1).unwrap();
    let fft_prices = FftPricer::default().price(&request, &heston, -0.5, 1e-10).unwrap();
    assert!(fft_prices.len() >= 21);

    let pricer = FourierPricer::default();
    for (strike, fft_price) in fft_prices {
        let option = ForwardOption::new(forward, strike, discount_factor, maturity, true).unwrap();
        let price = pricer.price(&option, &heston, -0.5, 1e-10, None).unwrap();
        let fft_vol =
            implied_volatility(fft_price, forward, strike, discount_factor, maturity, true).unwrap();
        let vol = implied_volatility(price, forward, strike, discount_factor, maturity, true).unwrap();
        assert_abs_diff_eq!(fft_vol, vol, epsilon = 1e-3);
        assert_abs_diff_eq!(vol, 0.36, epsilon = 1e-2);
    }
}

#[test]
fn uncorrelated_heston_prices_as_a_time_changed_gaussian() {
    let parameters = HestonParameters {
        kappa: 1.5,
        theta: 0.06,
        vol0: 0.04,
        omega: 0.5,
        rho: 0.0,
    };
    let heston = HestonCharacteristicExponent::new(parameters).unwrap();
    let scale = parameters.vol0.sqrt();
    let time_changed = TimeChangedCharacteristicExponent::new(
        GaussianCharacteristicExponent::risk_neutral(scale).unwrap(),
        IntegratedCirTimeChange::new(
            parameters.kappa,
            parameters.theta / parameters.vol0,
            parameters.omega / scale,
        )
        .unwrap(),
    );
    let (alpha, tolerance) = (-0.5, 1e-10);
    let request = ForwardStrikeGrid::new(1.0, 0.98, 1.5, false, 41, 0.4).unwrap();
    let transform = EuropeanCallFourierTransform::new(&heston);
    let limit = IntegralLimitCalculator::new(&transform, alpha, request.maturity(), tolerance)
        .unwrap()
        .calculate()
        .unwrap();
    let grid = FftGrid::new(&request, alpha, tolerance, limit).unwrap();

    let pricer = FftPricer::default();
    let expected = pricer.price_on_grid(&request, &heston, alpha, &grid).unwrap();
    let prices = pricer.price_on_grid(&request, &time_changed, alpha, &grid).unwrap();
    assert_eq!(expected.len(), prices.len());
    for ((strike, expected), (other_strike, price)) in expected.iter().zip(prices.iter()) {
        assert_eq!(strike, other_strike);
        assert_abs_diff_eq!(*price, *expected, epsilon = 1e-12);
    }
}

#[test]
fn fft_and_quadrature_agree_for_cgmy_puts() {
    let cgmy = CgmyCharacteristicExponent::new(1.0, 5.0, 5.0, 0.5).unwrap();
    let request = ForwardStrikeGrid::new(100.0, 0.9, 1.0, false, 11, 0.25).unwrap();
    let fft_prices = FftPricer::default().price(&request, &cgmy, -0.5, 1e-10).unwrap();
    let pricer = FourierPricer::default();
    for (strike, fft_price) in fft_prices {
        let option = ForwardOption::new(100.0, strike, 0.9, 1.0, false).unwrap();
        let price = pricer.price(&option, &cgmy, -0.5, 1e-10, None).unwrap();
        assert_abs_diff_eq!(fft_price, price, epsilon = 1e-6);
    }
}

#[test]
fn a_shared_pricer_can_be_used_across_threads() {
    let pricer = FourierPricer::default();
    let exponent = GaussianCharacteristicExponent::risk_neutral(0.25).unwrap();
    let option = ForwardOption::new(50.0, 55.0, 0.99, 0.5, true).unwrap();
    let single = pricer.price(&option, &exponent, -0.5, 1e-10, None).unwrap();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| pricer.price(&option, &exponent, -0.5, 1e-10, None).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), single);
        }
    });
}
